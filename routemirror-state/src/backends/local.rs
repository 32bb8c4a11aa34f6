//! Local file backend for the mirror
//!
//! Stores the mirror in a local JSON file (default: routemirror.mirror.json).
//! Every mutation is a read-modify-write of the whole file, done while
//! holding a `.lock` file next to it so that writers in other processes
//! wait their turn. The new content is written to a temporary file and
//! renamed into place, so readers see either the old or the new mirror.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use routemirror_core::effect::Effect;
use routemirror_core::route::{ItemKey, PersistedRoute};
use routemirror_core::store::{MirrorStore, StoreError, StoreResult};

use crate::backend::BackendConfig;
use crate::mirror::MirrorFile;

/// How long a writer waits for the lock before giving up, unless configured
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);
/// A lock file older than this is left over from a crashed writer
const STALE_LOCK_AGE: Duration = Duration::from_secs(120);
const LOCK_POLL_MIN: Duration = Duration::from_millis(2);
const LOCK_POLL_MAX: Duration = Duration::from_millis(100);

/// Local file store for development and offline runs
pub struct LocalStore {
    path: PathBuf,
    lock_path: PathBuf,
    lock_wait: Duration,
    /// Queues writers of this instance so they do not poll the lock file
    write_lock: Mutex<()>,
}

impl LocalStore {
    /// Default mirror file name
    pub const DEFAULT_MIRROR_FILE: &'static str = "routemirror.mirror.json";

    /// Create a new LocalStore with the default path in the current directory
    pub fn new() -> Self {
        Self::with_path(PathBuf::from(Self::DEFAULT_MIRROR_FILE))
    }

    pub fn with_path(path: PathBuf) -> Self {
        let lock_path = sibling(&path, "lock");
        Self {
            path,
            lock_path,
            lock_wait: DEFAULT_LOCK_WAIT,
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    /// Create a LocalStore from configuration
    pub fn from_config(config: &BackendConfig) -> StoreResult<Self> {
        let path = config
            .get_string("path")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_MIRROR_FILE));

        let mut store = Self::with_path(path);
        if let Some(secs) = config.get_string("lock_wait_secs") {
            let secs: u64 = secs.parse().map_err(|_| {
                StoreError::configuration(format!("lock_wait_secs is not a number: {}", secs))
            })?;
            store = store.with_lock_wait(Duration::from_secs(secs));
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Read the mirror file; a missing file is an empty mirror
    pub fn read_file(&self) -> StoreResult<MirrorFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(MirrorFile::new()),
            Err(e) => {
                return Err(StoreError::Io(format!("Failed to read mirror file: {}", e)));
            }
        };

        let mut file: MirrorFile = serde_json::from_str(&content).map_err(|e| {
            StoreError::InvalidItem(format!("Failed to parse mirror file: {}", e))
        })?;
        file.normalize();
        Ok(file)
    }

    /// Write through a temporary file renamed over the mirror
    fn write_file(&self, file: &MirrorFile) -> StoreResult<()> {
        let content = serde_json::to_string_pretty(file).map_err(|e| {
            StoreError::Serialization(format!("Failed to serialize mirror: {}", e))
        })?;

        let tmp_path = sibling(&self.path, "tmp");
        std::fs::write(&tmp_path, content)
            .map_err(|e| StoreError::Io(format!("Failed to write mirror file: {}", e)))?;
        std::fs::rename(&tmp_path, &self.path)
            .map_err(|e| StoreError::Io(format!("Failed to replace mirror file: {}", e)))?;

        Ok(())
    }

    /// Take the lock file, waiting for other writers and clearing a stale one
    async fn acquire_lock(&self) -> StoreResult<LockFile> {
        let started = Instant::now();
        let mut poll = LOCK_POLL_MIN;

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    // Holder details are informational only
                    let _ = writeln!(file, "pid={}", std::process::id());
                    return Ok(LockFile {
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(StoreError::Io(format!("Failed to create lock file: {}", e)));
                }
            }

            if self.lock_is_stale() {
                log::warn!("Removing stale lock {}", self.lock_path.display());
                let _ = std::fs::remove_file(&self.lock_path);
                continue;
            }
            if started.elapsed() >= self.lock_wait {
                return Err(StoreError::Locked(self.lock_path.display().to_string()));
            }

            tokio::time::sleep(poll).await;
            poll = (poll * 2).min(LOCK_POLL_MAX);
        }
    }

    fn lock_is_stale(&self) -> bool {
        std::fs::metadata(&self.lock_path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > STALE_LOCK_AGE)
    }

    async fn modify<F>(&self, change: F) -> StoreResult<()>
    where
        F: FnOnce(&mut MirrorFile) + Send,
    {
        let _queued = self.write_lock.lock().await;
        let _lock = self.acquire_lock().await?;

        let mut file = self.read_file()?;
        change(&mut file);
        file.increment_serial();
        self.write_file(&file)
    }
}

/// Held lock file; removed on drop
struct LockFile {
    path: PathBuf,
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
    }
}

/// `mirror.json` -> `mirror.json.<suffix>`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MirrorStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn query_partition(&self, hash_key: &str) -> StoreResult<Vec<PersistedRoute>> {
        let file = self.read_file()?;
        Ok(file.partition(hash_key).cloned().collect())
    }

    async fn put_item(&self, route: &PersistedRoute) -> StoreResult<()> {
        let route = route.clone();
        self.modify(move |file| file.upsert(route)).await
    }

    async fn delete_item(&self, key: &ItemKey) -> StoreResult<()> {
        self.modify(|file| {
            file.remove(key);
        })
        .await
    }

    /// One file rewrite per batch
    async fn batch_write(&self, effects: &[Effect]) -> StoreResult<Vec<Effect>> {
        self.modify(|file| {
            for effect in effects {
                match effect {
                    Effect::Put(route) => file.upsert(route.clone()),
                    Effect::Delete(key) => {
                        file.remove(key);
                    }
                }
            }
        })
        .await?;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn row(hash: &str, sort: &str) -> PersistedRoute {
        PersistedRoute::from_key(ItemKey::new(hash, sort))
    }

    #[tokio::test]
    async fn test_local_store_read_write() {
        let dir = tempdir().unwrap();
        let store = LocalStore::with_path(dir.path().join("mirror.json"));

        // Initially empty
        assert!(store.query_partition("rtb-a").await.unwrap().is_empty());

        store.put_item(&row("rtb-a", "10.0.0.0/16#r#a#vpc")).await.unwrap();
        store.put_item(&row("rtb-b", "10.9.0.0/16#r#b#vpc")).await.unwrap();

        let rows = store.query_partition("rtb-a").await.unwrap();
        assert_eq!(rows, vec![row("rtb-a", "10.0.0.0/16#r#a#vpc")]);
        assert_eq!(store.read_file().unwrap().serial, 2);
    }

    #[tokio::test]
    async fn test_delete_absent_key_is_ok() {
        let dir = tempdir().unwrap();
        let store = LocalStore::with_path(dir.path().join("mirror.json"));

        store.delete_item(&ItemKey::new("rtb-a", "missing")).await.unwrap();
        assert!(store.read_file().unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn test_batch_write_applies_everything() {
        let dir = tempdir().unwrap();
        let store = LocalStore::with_path(dir.path().join("mirror.json"));
        store.put_item(&row("rtb-a", "old")).await.unwrap();

        let unprocessed = store
            .batch_write(&[
                Effect::Put(row("rtb-a", "new-1")),
                Effect::Put(row("rtb-a", "new-2")),
                Effect::Delete(ItemKey::new("rtb-a", "old")),
            ])
            .await
            .unwrap();

        assert!(unprocessed.is_empty());
        let keys: Vec<_> = store
            .query_partition("rtb-a")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.key.sort_key)
            .collect();
        assert_eq!(keys, vec!["new-1", "new-2"]);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_invalid_item() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = LocalStore::with_path(path);
        let result = store.query_partition("rtb-a").await;
        assert!(matches!(result, Err(StoreError::InvalidItem(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_stores_on_one_file_keep_every_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        let first = Arc::new(LocalStore::with_path(path.clone()));
        let second = Arc::new(LocalStore::with_path(path.clone()));
        let reader = LocalStore::with_path(path);

        let mut writers = Vec::new();
        for (name, store) in [("a", first), ("b", second)] {
            writers.push(tokio::spawn(async move {
                for i in 0..40 {
                    let key = format!("10.{}.0.0/16#vpc-{}#att#vpc", i, name);
                    store.put_item(&row("rtb-a", &key)).await.unwrap();
                }
            }));
        }

        // Readers never see a half-written file
        while !writers.iter().all(|w| w.is_finished()) {
            reader.query_partition("rtb-a").await.unwrap();
            tokio::task::yield_now().await;
        }
        for writer in writers {
            writer.await.unwrap();
        }

        assert_eq!(reader.query_partition("rtb-a").await.unwrap().len(), 80);
        assert!(!reader.lock_path().exists());
    }

    #[tokio::test]
    async fn test_held_lock_times_out_as_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mirror.json");
        let holder = LocalStore::with_path(path.clone());
        let writer = LocalStore::with_path(path).with_lock_wait(Duration::from_millis(50));
        let held = holder.acquire_lock().await.unwrap();

        let result = writer.put_item(&row("rtb-a", "x")).await;
        assert!(matches!(result, Err(StoreError::Locked(_))));

        drop(held);
        writer.put_item(&row("rtb-a", "x")).await.unwrap();
        assert_eq!(writer.query_partition("rtb-a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stale_lock_is_cleared() {
        let dir = tempdir().unwrap();
        let store = LocalStore::with_path(dir.path().join("mirror.json"));
        let lock = std::fs::File::create(store.lock_path()).unwrap();
        let old = std::time::SystemTime::now() - STALE_LOCK_AGE * 2;
        lock.set_modified(old).unwrap();
        drop(lock);

        store.put_item(&row("rtb-a", "x")).await.unwrap();
        assert_eq!(store.query_partition("rtb-a").await.unwrap().len(), 1);
    }

    #[test]
    fn test_lock_and_temp_paths() {
        let store = LocalStore::with_path(PathBuf::from("state/mirror.json"));
        assert_eq!(store.lock_path(), Path::new("state/mirror.json.lock"));
        assert_eq!(
            sibling(store.path(), "tmp"),
            PathBuf::from("state/mirror.json.tmp")
        );
    }

    #[test]
    fn test_local_store_from_config() {
        let backend = LocalStore::from_config(&BackendConfig::new("local")).unwrap();
        assert_eq!(backend.path(), Path::new("routemirror.mirror.json"));

        let config = BackendConfig::new("local").with_attribute("path", "custom.json");
        let backend = LocalStore::from_config(&config).unwrap();
        assert_eq!(backend.path(), Path::new("custom.json"));

        let config = BackendConfig::new("local").with_attribute("lock_wait_secs", "5");
        let backend = LocalStore::from_config(&config).unwrap();
        assert_eq!(backend.lock_wait, Duration::from_secs(5));

        let config = BackendConfig::new("local").with_attribute("lock_wait_secs", "soon");
        assert!(matches!(
            LocalStore::from_config(&config),
            Err(StoreError::Configuration(_))
        ));
    }
}
