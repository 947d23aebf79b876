//! Pluggable key-value cache for LLM results and parsed non-code ranges.
//!
//! Values are opaque bytes grouped by namespace. Absence covers both
//! never-set and expired entries.

mod entry;
mod keys;
mod memory_store;
mod noop_store;
mod sled_store;

pub use keys::CacheKey;
pub use memory_store::MemoryCacheStore;
pub use noop_store::NoopCacheStore;
pub use sled_store::SledCacheStore;

use common::{CacheError, CacheResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

pub const NAMESPACE_TRIAGE: &str = "triage";
pub const NAMESPACE_ANALYSIS: &str = "analysis";
pub const NAMESPACE_NONCODE: &str = "noncode";

pub trait CacheStore: Send + Sync {
    fn get(&self, namespace: &str, key: &str) -> CacheResult<Option<Vec<u8>>>;

    fn set(&self, namespace: &str, key: &str, value: &[u8], ttl: Option<Duration>)
        -> CacheResult<()>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;

    fn stats(&self) -> CacheStats {
        CacheStats::default()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
}

/// Reads a JSON-encoded value. Undecodable entries count as misses.
pub fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    namespace: &str,
    key: &str,
) -> CacheResult<Option<T>> {
    match store.get(namespace, key)? {
        Some(bytes) => match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                tracing::warn!(namespace, error = %e, "dropping undecodable cache entry");
                Ok(None)
            }
        },
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(
    store: &dyn CacheStore,
    namespace: &str,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> CacheResult<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
    store.set(namespace, key, &bytes, ttl)
}
