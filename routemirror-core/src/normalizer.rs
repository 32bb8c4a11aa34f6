//! Normalizer - Bring live routes and mirror rows into one keyed form
//!
//! Both sides are keyed by [`ItemKey`], so the differ only compares keys.

use std::collections::BTreeMap;

use crate::route::{CanonicalRoute, ItemKey, PersistedRoute, RawLiveRoute};

/// Live routes keyed by storage identity
pub type LiveRoutes = BTreeMap<ItemKey, CanonicalRoute>;

/// Mirror rows keyed by storage identity
pub type MirrorRoutes = BTreeMap<ItemKey, PersistedRoute>;

/// Fan each raw route out into one canonical route per attachment.
///
/// A later entry with the same identity replaces an earlier one. Identity
/// covers every attachment field, so a collision is a true duplicate.
pub fn normalize_live(route_table_id: &str, routes: &[RawLiveRoute]) -> LiveRoutes {
    let mut keyed = LiveRoutes::new();

    for route in routes {
        for attachment in &route.attachments {
            let canonical = CanonicalRoute::from_attachment(route_table_id, route, attachment);
            log::debug!("normalized live route {}", canonical.key());
            keyed.insert(canonical.item_key(), canonical);
        }
    }

    keyed
}

/// Key mirror rows by their stored identity (last one wins)
pub fn normalize_mirror(records: impl IntoIterator<Item = PersistedRoute>) -> MirrorRoutes {
    records
        .into_iter()
        .map(|record| (record.key.clone(), record))
        .collect()
}
