pub mod errors;
pub mod hashing;
pub mod structured_logging;

pub use errors::{
    CacheError, CacheResult, ConfigError, ConfigResult, ImpactError, ImpactResult, LlmError,
    LlmResult,
};
pub use hashing::{sha256_hex, Fingerprint};
pub use structured_logging::{init_structured_logging, LoggingConfig, OperationTimer};
