use crate::entry::{now_millis, CachedEntry};
use crate::{CacheStats, CacheStore};
use common::{CacheError, CacheResult};
use parking_lot::RwLock;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Persistent store: one sled tree per namespace, bincode-encoded entries.
pub struct SledCacheStore {
    db: Arc<Db>,
    stats: RwLock<CacheStats>,
}

impl SledCacheStore {
    /// Opens the database and drops entries that expired since the last run.
    pub fn open(path: impl AsRef<Path>) -> CacheResult<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .map_err(|e| CacheError::Backend(format!("failed to open {}: {e}", path.display())))?;
        let store = Self {
            db: Arc::new(db),
            stats: RwLock::new(CacheStats::default()),
        };
        match store.purge_expired() {
            Ok(purged) => info!(path = %path.display(), purged, "opened persistent cache"),
            Err(e) => warn!(path = %path.display(), error = %e, "failed to purge expired cache entries"),
        }
        Ok(store)
    }

    fn tree(&self, namespace: &str) -> CacheResult<sled::Tree> {
        self.db
            .open_tree(namespace)
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    pub fn flush(&self) -> CacheResult<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| CacheError::Backend(e.to_string()))
    }

    /// Removes every expired entry. Returns how many were dropped.
    pub fn purge_expired(&self) -> CacheResult<usize> {
        let now = now_millis();
        let mut removed = 0;
        for name in self.db.tree_names() {
            let tree = self
                .db
                .open_tree(&name)
                .map_err(|e| CacheError::Backend(e.to_string()))?;
            for item in tree.iter() {
                let (key, bytes) = item.map_err(|e| CacheError::Backend(e.to_string()))?;
                let expired = bincode::deserialize::<CachedEntry>(&bytes)
                    .map(|entry| entry.is_expired(now))
                    .unwrap_or(true);
                if expired {
                    tree.remove(key)
                        .map_err(|e| CacheError::Backend(e.to_string()))?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

impl Drop for SledCacheStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush persistent cache");
        }
    }
}

impl CacheStore for SledCacheStore {
    fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let tree = self.tree(namespace)?;
        let value = match tree.get(key).map_err(|e| CacheError::Backend(e.to_string()))? {
            Some(bytes) => match bincode::deserialize::<CachedEntry>(&bytes) {
                Ok(entry) if entry.is_expired(now_millis()) => {
                    debug!(namespace, "cache entry expired");
                    tree.remove(key)
                        .map_err(|e| CacheError::Backend(e.to_string()))?;
                    None
                }
                Ok(entry) => Some(entry.value),
                Err(e) => {
                    debug!(namespace, error = %e, "failed to decode cache entry");
                    tree.remove(key)
                        .map_err(|e| CacheError::Backend(e.to_string()))?;
                    None
                }
            },
            None => None,
        };

        let mut stats = self.stats.write();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    fn set(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> CacheResult<()> {
        let entry = CachedEntry::new(value.to_vec(), ttl);
        let bytes =
            bincode::serialize(&entry).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.tree(namespace)?
            .insert(key, bytes)
            .map_err(|e| CacheError::Backend(e.to_string()))?;
        self.stats.write().inserts += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sled"
    }

    fn stats(&self) -> CacheStats {
        *self.stats.read()
    }
}
