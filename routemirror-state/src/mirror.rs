//! Mirror file structure for the local backend

use serde::{Deserialize, Serialize};

use routemirror_core::route::{ItemKey, PersistedRoute};

/// Snapshot of the mirror as written by the local backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorFile {
    /// Mirror file format version
    pub version: u32,
    /// Incremented on every write
    pub serial: u64,
    /// Rows, kept sorted by key
    pub items: Vec<PersistedRoute>,
}

impl MirrorFile {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new() -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            serial: 0,
            items: Vec::new(),
        }
    }

    pub fn increment_serial(&mut self) {
        self.serial += 1;
    }

    /// Rows whose hash key is `hash_key`
    pub fn partition<'a>(&'a self, hash_key: &'a str) -> impl Iterator<Item = &'a PersistedRoute> {
        self.items.iter().filter(move |r| r.key.hash_key == hash_key)
    }

    /// Insert a row or overwrite the row with the same key
    pub fn upsert(&mut self, route: PersistedRoute) {
        match self.items.binary_search_by(|r| r.key.cmp(&route.key)) {
            Ok(pos) => self.items[pos] = route,
            Err(pos) => self.items.insert(pos, route),
        }
    }

    /// Remove the row with this key, if any
    pub fn remove(&mut self, key: &ItemKey) -> Option<PersistedRoute> {
        self.items
            .binary_search_by(|r| r.key.cmp(key))
            .ok()
            .map(|pos| self.items.remove(pos))
    }

    /// Restore key order after loading a hand-edited file
    pub fn normalize(&mut self) {
        // Last write wins: reversed, the stable sort puts the newest copy first
        self.items.reverse();
        self.items.sort_by(|a, b| a.key.cmp(&b.key));
        self.items.dedup_by(|dropped, kept| dropped.key == kept.key);
    }
}

impl Default for MirrorFile {
    fn default() -> Self {
        Self::new()
    }
}
