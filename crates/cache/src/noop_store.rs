use crate::CacheStore;
use common::CacheResult;
use std::time::Duration;

/// Used when caching is disabled: every read misses, writes are dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheStore;

impl CacheStore for NoopCacheStore {
    fn get(&self, _namespace: &str, _key: &str) -> CacheResult<Option<Vec<u8>>> {
        Ok(None)
    }

    fn set(&self, _: &str, _: &str, _: &[u8], _: Option<Duration>) -> CacheResult<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "noop"
    }
}
