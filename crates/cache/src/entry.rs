use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Stored envelope: payload plus creation and optional expiry, in unix millis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CachedEntry {
    pub value: Vec<u8>,
    pub created_at: i64,
    pub expires_at: Option<i64>,
}

impl CachedEntry {
    pub fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        let now = now_millis();
        Self {
            value,
            created_at: now,
            expires_at: ttl.map(|ttl| now.saturating_add(ttl.as_millis() as i64)),
        }
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
