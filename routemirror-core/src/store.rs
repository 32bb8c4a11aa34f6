//! Store - Trait for the persisted route mirror
//!
//! Rows are keyed by [`ItemKey`]. Every mutation is idempotent: a put
//! overwrites by key and a delete of an absent key succeeds. This is what lets
//! overlapping runs converge without a lock.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::effect::Effect;
use crate::route::{ItemKey, PersistedRoute};

/// Largest batch most stores accept (DynamoDB BatchWriteItem limit)
pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;

/// Errors that can occur when reading or writing the mirror
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend type is not supported
    #[error("Unsupported backend type: {0}")]
    UnsupportedBackend(String),

    /// Configuration error
    #[error("Backend configuration error: {0}")]
    Configuration(String),

    /// A stored row could not be decoded
    #[error("Invalid mirror item: {0}")]
    InvalidItem(String),

    /// Items were still unprocessed after all retries
    #[error("{count} writes left unprocessed after retries")]
    Unprocessed { count: usize },

    /// A batch failed part way; `applied` landed before `source` stopped it
    #[error("Batch stopped after {} writes: {source}", .applied.len())]
    PartialBatch {
        applied: Vec<Effect>,
        source: Box<StoreError>,
    },

    /// Another writer holds the mirror
    #[error("Mirror is locked: {0}")]
    Locked(String),

    /// Network or I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unsupported_backend(backend_type: impl Into<String>) -> Self {
        Self::UnsupportedBackend(backend_type.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Storage backend for the mirror
#[async_trait]
pub trait MirrorStore: Send + Sync {
    /// Name of this backend (e.g., "dynamodb")
    fn name(&self) -> &'static str;

    /// All rows in one route table's partition
    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>>;

    /// Write a row, overwriting any row with the same key
    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()>;

    /// Delete a row; an absent key is not an error
    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()>;

    /// Apply a batch of effects and return the ones the store did not
    /// process. The default applies them one at a time; a failure after the
    /// first write is reported as [`StoreError::PartialBatch`].
    async fn batch_write(&self, effects: &[Effect]) -> StoreResult<Vec<Effect>> {
        for (index, effect) in effects.iter().enumerate() {
            let result = match effect {
                Effect::Put(route) => self.put_item(route).await,
                Effect::Delete(key) => self.delete_item(key).await,
            };
            if let Err(e) = result {
                if index == 0 {
                    return Err(e);
                }
                return Err(StoreError::PartialBatch {
                    applied: effects[..index].to_vec(),
                    source: Box::new(e),
                });
            }
        }
        Ok(Vec::new())
    }

    /// Largest batch accepted by [`MirrorStore::batch_write`]
    fn max_batch_size(&self) -> usize {
        DEFAULT_MAX_BATCH_SIZE
    }
}

/// In-process store, used for dry runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<BTreeMap<ItemKey, PersistedRoute>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rows
    pub fn with_rows(rows: impl IntoIterator<Item = PersistedRoute>) -> Self {
        let store = Self::new();
        if let Ok(mut guard) = store.rows.lock() {
            guard.extend(rows.into_iter().map(|row| (row.key.clone(), row)));
        }
        store
    }

    /// Snapshot of every row, ordered by key
    pub fn rows(&self) -> Vec<PersistedRoute> {
        self.rows
            .lock()
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().map(|rows| rows.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(
        &self,
    ) -> StoreResult<std::sync::MutexGuard<'_, BTreeMap<ItemKey, PersistedRoute>>> {
        self.rows
            .lock()
            .map_err(|e| StoreError::Io(format!("Memory store poisoned: {}", e)))
    }
}

#[async_trait]
impl MirrorStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>> {
        Ok(self
            .lock()?
            .values()
            .filter(|row| row.key.hash_key == hash_key)
            .cloned()
            .collect())
    }

    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()> {
        self.lock()?.insert(route.key.clone(), route.clone());
        Ok(())
    }

    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RejectingStore;

    fn row(hash: &str, sort: &str) -> PersistedRoute {
        PersistedRoute::from_key(ItemKey::new(hash, sort))
    }

    #[tokio::test]
    async fn query_is_scoped_to_partition() {
        let store = MemoryStore::with_rows([row("prod", "a#b#c#d"), row("nonprod", "a#b#c#d")]);

        let rows = store.query_partition("prod").await.unwrap();
        assert_eq!(rows, vec![row("prod", "a#b#c#d")]);
    }

    #[tokio::test]
    async fn put_overwrites_by_key() {
        let store = MemoryStore::new();
        let mut first = row("prod", "a#b#c#d");
        first.state = Some("active".to_string());
        let mut second = first.clone();
        second.state = Some("blackhole".to_string());

        store.put_item(&first).await.unwrap();
        store.put_item(&second).await.unwrap();

        assert_eq!(store.rows(), vec![second]);
    }

    #[tokio::test]
    async fn deleting_absent_key_is_a_no_op() {
        let store = MemoryStore::with_rows([row("prod", "a#b#c#d")]);

        store
            .delete_item(&ItemKey::new("prod", "x#y#z#w"))
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn default_batch_write_applies_every_effect() {
        let store = MemoryStore::with_rows([row("prod", "old#b#c#d")]);
        let effects = vec![
            Effect::Put(row("prod", "new#b#c#d")),
            Effect::Delete(ItemKey::new("prod", "old#b#c#d")),
        ];

        let unprocessed = store.batch_write(&effects).await.unwrap();
        assert!(unprocessed.is_empty());
        assert_eq!(store.rows(), vec![row("prod", "new#b#c#d")]);
    }

    #[tokio::test]
    async fn default_batch_write_reports_partial_progress() {
        let store = RejectingStore::new("prod", "bad#b#c#d");
        let effects = vec![
            Effect::Put(row("prod", "good#b#c#d")),
            Effect::Put(row("prod", "bad#b#c#d")),
            Effect::Put(row("prod", "later#b#c#d")),
        ];

        match store.batch_write(&effects).await {
            Err(StoreError::PartialBatch { applied, source }) => {
                assert_eq!(applied, effects[..1].to_vec());
                assert!(matches!(*source, StoreError::Aws(_)));
            }
            other => panic!("Expected PartialBatch, got {:?}", other),
        }
        assert_eq!(store.inner.rows(), vec![row("prod", "good#b#c#d")]);
    }

    #[tokio::test]
    async fn default_batch_write_failing_first_effect_is_plain_error() {
        let store = RejectingStore::new("prod", "bad#b#c#d");

        let result = store
            .batch_write(&[Effect::Put(row("prod", "bad#b#c#d"))])
            .await;
        assert!(matches!(result, Err(StoreError::Aws(_))));
    }

    #[test]
    fn store_error_display() {
        assert_eq!(
            StoreError::unsupported_backend("s3").to_string(),
            "Unsupported backend type: s3"
        );
        assert_eq!(
            StoreError::Unprocessed { count: 3 }.to_string(),
            "3 writes left unprocessed after retries"
        );
    }
}
