//! Effect - One idempotent mutation of the mirror
//!
//! Effects carry everything the store needs, so applying one twice leaves the
//! same row (or absence of a row) as applying it once.

use crate::route::{ItemKey, PersistedRoute};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Write the row, overwriting any row with the same key
    Put(PersistedRoute),
    /// Delete the row with this key; deleting an absent key is a no-op
    Delete(ItemKey),
}

impl Effect {
    pub fn key(&self) -> &ItemKey {
        match self {
            Effect::Put(route) => &route.key,
            Effect::Delete(key) => key,
        }
    }

    pub fn is_put(&self) -> bool {
        matches!(self, Effect::Put(_))
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Put(route) => write!(f, "+ {}", route.key),
            Effect::Delete(key) => write!(f, "- {}", key),
        }
    }
}
