use crate::entry::{now_millis, CachedEntry};
use crate::{CacheStats, CacheStore};
use common::CacheResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;

/// Process-local store. Contents are lost when the run ends.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<(String, String), CachedEntry>>,
    stats: RwLock<CacheStats>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let id = (namespace.to_string(), key.to_string());
        let now = now_millis();

        let hit = {
            let entries = self.entries.read();
            match entries.get(&id) {
                Some(entry) if !entry.is_expired(now) => Some(Some(entry.value.clone())),
                Some(_) => None,
                None => Some(None),
            }
        };

        let value = match hit {
            Some(value) => value,
            None => {
                self.entries.write().remove(&id);
                None
            }
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
        self.entries.write().insert(
            (namespace.to_string(), key.to_string()),
            CachedEntry::new(value.to_vec(), ttl),
        );
        self.stats.write().inserts += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }

    fn stats(&self) -> CacheStats {
        *self.stats.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_namespaces() {
        let store = MemoryCacheStore::new();
        store.set("triage", "k", b"v", None).unwrap();
        assert_eq!(store.get("triage", "k").unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.get("analysis", "k").unwrap(), None);
        assert_eq!(store.stats(), CacheStats { hits: 1, misses: 1, inserts: 1 });
    }

    #[test]
    fn test_expired_entries_removed_on_read() {
        let store = MemoryCacheStore::new();
        store.set("triage", "k", b"v", Some(Duration::ZERO)).unwrap();
        assert_eq!(store.get("triage", "k").unwrap(), None);
        assert!(store.is_empty());
    }
}
