//! Process-wide secrets, loaded once at startup.

use crate::config::ImpactScanConfig;
use common::{ConfigError, ConfigResult};
use std::fmt;

const AZURE_KEY_VAR: &str = "IMPACTSCAN_AZURE_OPENAI_API_KEY";
const OPENAI_KEY_VAR: &str = "IMPACTSCAN_OPENAI_API_KEY";

/// Immutable secrets passed explicitly into provider constructors.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Settings {
    azure_openai_api_key: Option<String>,
    openai_api_key: Option<String>,
}

impl Settings {
    /// Reads `.env` (if present) and then the process environment.
    ///
    /// The `IMPACTSCAN_*` variables take precedence over the variable named by
    /// each provider's `api_key_env`.
    pub fn load(config: &ImpactScanConfig) -> Self {
        match dotenv::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to parse .env"),
        }

        let azure_openai_api_key =
            read_var(AZURE_KEY_VAR).or_else(|| read_var(&config.azure_openai.api_key_env));
        let openai_api_key =
            read_var(OPENAI_KEY_VAR).or_else(|| read_var(&config.openai.api_key_env));

        Self {
            azure_openai_api_key,
            openai_api_key,
        }
    }

    pub fn from_values(azure_openai_api_key: Option<String>, openai_api_key: Option<String>) -> Self {
        Self {
            azure_openai_api_key: azure_openai_api_key.filter(|k| !k.trim().is_empty()),
            openai_api_key: openai_api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn azure_openai_api_key(&self) -> Option<&str> {
        self.azure_openai_api_key.as_deref()
    }

    pub fn openai_api_key(&self) -> Option<&str> {
        self.openai_api_key.as_deref()
    }

    pub fn require_azure_key(&self, env_name: &str) -> ConfigResult<&str> {
        self.azure_openai_api_key()
            .ok_or_else(|| ConfigError::MissingSecret(format!("{AZURE_KEY_VAR} or {env_name}")))
    }

    pub fn require_openai_key(&self, env_name: &str) -> ConfigResult<&str> {
        self.openai_api_key()
            .ok_or_else(|| ConfigError::MissingSecret(format!("{OPENAI_KEY_VAR} or {env_name}")))
    }
}

fn read_var(name: &str) -> Option<String> {
    if name.trim().is_empty() {
        return None;
    }
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Settings")
            .field("azure_openai_api_key", &mask(&self.azure_openai_api_key))
            .field("openai_api_key", &mask(&self.openai_api_key))
            .finish()
    }
}
