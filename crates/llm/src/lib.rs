//! Model access for ImpactScan: the vendor-neutral [`LlmClient`] contract,
//! provider adapters, retry/backoff, the shared rate limiter and prompt
//! templates.

pub mod factory;
pub mod json;
pub mod prompts;
pub mod providers;
pub mod rate_limiter;
pub mod retry;

pub use factory::{build_clients, LlmClients, SharedClient};
pub use json::extract_json_object;
pub use providers::*;
pub use rate_limiter::{RateLimiter, RateLimits, Reservation};
pub use retry::{calculate_backoff_delay, execute_with_retry, RetryConfig, RetryableError};
