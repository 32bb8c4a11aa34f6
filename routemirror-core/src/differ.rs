//! Differ - Compare live routes with the mirror
//!
//! Only key presence counts. A route whose key exists on both sides is left
//! alone even when its state or type differs; there is no update path.

use crate::normalizer::{LiveRoutes, MirrorRoutes};
use crate::route::{CanonicalRoute, PersistedRoute};

/// Routes to add to and remove from the mirror
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteDiff {
    /// In live, missing from the mirror (values from live)
    pub added: Vec<CanonicalRoute>,
    /// In the mirror, gone from live (values from the mirror)
    pub removed: Vec<PersistedRoute>,
    /// Keys present on both sides, left untouched
    pub unchanged: usize,
}

impl RouteDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            added: self.added.len(),
            removed: self.removed.len(),
            unchanged: self.unchanged,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
}

impl std::fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to add, {} to remove, {} unchanged",
            self.added, self.removed, self.unchanged
        )
    }
}

/// Compute `live \ mirror` and `mirror \ live` by key
pub fn diff(live: &LiveRoutes, mirror: &MirrorRoutes) -> RouteDiff {
    let added = live
        .iter()
        .filter(|(key, _)| !mirror.contains_key(*key))
        .map(|(_, route)| route.clone())
        .collect();

    let removed = mirror
        .iter()
        .filter(|(key, _)| !live.contains_key(*key))
        .map(|(_, record)| record.clone())
        .collect();

    let unchanged = live.keys().filter(|key| mirror.contains_key(*key)).count();

    RouteDiff {
        added,
        removed,
        unchanged,
    }
}
