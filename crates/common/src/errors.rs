use std::time::Duration;
use thiserror::Error;

/// Run-level error taxonomy for ImpactScan.
///
/// Config, tool-unavailable and intention failures abort a run. Per-item
/// stage failures never surface here; they are recorded in the run summary.
#[derive(Error, Debug)]
pub enum ImpactError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Search tool unavailable: {tool} - {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("Response format error in {context}: {reason}")]
    ResponseFormat { context: String, reason: String },

    #[error("Rate limit exceeded: {limit}")]
    RateLimitExceeded { limit: String },

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImpactError {
    pub fn tool_unavailable(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ToolUnavailable {
            tool: tool.into(),
            reason: reason.into(),
        }
    }

    pub fn response_format(context: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResponseFormat {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// True for failures that end the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Cache(_) | Self::RateLimitExceeded { .. })
    }
}

/// Errors raised while talking to an LLM provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("API request failed: {provider} - {status}: {body}")]
    Http {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Transport failure: {provider} - {reason}")]
    Transport { provider: String, reason: String },

    #[error("Request timed out: {provider} after {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Authentication failed: {provider} - {reason}")]
    Authentication { provider: String, reason: String },

    #[error("Response parsing failed: {reason}")]
    ResponseFormat { reason: String },
}

impl LlmError {
    pub fn format(reason: impl Into<String>) -> Self {
        Self::ResponseFormat {
            reason: reason.into(),
        }
    }

    /// Transport glitches, timeouts, throttling, server errors and malformed
    /// replies are retryable. Client errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => matches!(status, 408 | 429 | 500..=599),
            Self::Transport { .. } | Self::Timeout { .. } | Self::ResponseFormat { .. } => true,
            Self::Authentication { .. } => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http { status: 429, .. } => "rate_limit",
            Self::Http { status: 500..=599, .. } => "server_error",
            Self::Http { .. } => "http",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Authentication { .. } => "authentication",
            Self::ResponseFormat { .. } => "response_format",
        }
    }

    pub fn is_format(&self) -> bool {
        matches!(self, Self::ResponseFormat { .. })
    }
}

/// Configuration errors; fail fast before any work starts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read configuration {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("LLM client is not configured: {0}")]
    MissingClient(String),

    #[error("Missing secret: environment variable {0} is not set")]
    MissingSecret(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Cache backend errors. Stages log these and treat them as misses.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    #[error("Cache backend failure: {0}")]
    Backend(String),

    #[error("Cache serialization failure: {0}")]
    Serialization(String),
}

pub type ImpactResult<T> = Result<T, ImpactError>;
pub type LlmResult<T> = Result<T, LlmError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type CacheResult<T> = Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn http(status: u16) -> LlmError {
        LlmError::Http {
            provider: "openai".to_string(),
            status,
            body: String::new(),
        }
    }

    #[rstest]
    #[case(429, true)]
    #[case(500, true)]
    #[case(503, true)]
    #[case(408, true)]
    #[case(400, false)]
    #[case(401, false)]
    #[case(404, false)]
    fn test_http_status_retryability(#[case] status: u16, #[case] retryable: bool) {
        assert_eq!(http(status).is_retryable(), retryable);
    }

    #[test]
    fn test_format_and_timeout_are_retryable() {
        assert!(LlmError::format("missing field").is_retryable());
        assert!(LlmError::Timeout {
            provider: "azure".to_string(),
            after: Duration::from_secs(1),
        }
        .is_retryable());
        assert_eq!(http(429).kind(), "rate_limit");
    }

    #[test]
    fn test_config_error_converts_into_impact_error() {
        let err: ImpactError = ConfigError::invalid("target_dir", "must not be blank").into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("target_dir"));
    }
}
