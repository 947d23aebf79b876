use crate::providers::LlmClient;
#[cfg(feature = "azure")]
use crate::providers::AzureProvider;
#[cfg(feature = "openai")]
use crate::providers::OpenAIProvider;
use common::{ConfigError, ConfigResult};
use domain::{ImpactScanConfig, Settings};
use std::sync::Arc;
use tracing::info;

pub type SharedClient = Arc<dyn LlmClient>;

/// The two model tiers the pipeline uses: a cheap one for intention and
/// triage, a stronger one for deep analysis.
#[derive(Clone)]
pub struct LlmClients {
    pub small: SharedClient,
    pub large: SharedClient,
}

impl LlmClients {
    pub fn new(small: SharedClient, large: SharedClient) -> Self {
        Self { small, large }
    }

    /// Same client for both tiers.
    pub fn single(client: SharedClient) -> Self {
        Self {
            small: Arc::clone(&client),
            large: client,
        }
    }
}

impl std::fmt::Debug for LlmClients {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClients")
            .field("small", &self.small.name())
            .field("large", &self.large.name())
            .finish()
    }
}

/// Builds provider adapters from configuration. Azure wins when both are
/// enabled.
pub fn build_clients(config: &ImpactScanConfig, settings: &Settings) -> ConfigResult<LlmClients> {
    let timeout = config.analysis.request_timeout();

    #[cfg(feature = "azure")]
    if config.azure_openai.enabled {
        let az = &config.azure_openai;
        let key = settings.require_azure_key(&az.api_key_env)?;
        let small = AzureProvider::new(&az.endpoint, key, &az.deployments.small, &az.api_version)?
            .with_timeout(timeout)?;
        let large = AzureProvider::new(&az.endpoint, key, &az.deployments.large, &az.api_version)?
            .with_timeout(timeout)?;
        info!(
            small = %az.deployments.small,
            large = %az.deployments.large,
            "using Azure OpenAI deployments"
        );
        return Ok(LlmClients::new(Arc::new(small), Arc::new(large)));
    }

    #[cfg(feature = "openai")]
    if config.openai.enabled {
        let oa = &config.openai;
        let key = settings.require_openai_key(&oa.api_key_env)?;
        let small = OpenAIProvider::new(key, &oa.model_small, Some(oa.base_url.clone()))?
            .with_timeout(timeout)?;
        let large = OpenAIProvider::new(key, &oa.model_large, Some(oa.base_url.clone()))?
            .with_timeout(timeout)?;
        info!(small = %oa.model_small, large = %oa.model_large, "using OpenAI models");
        return Ok(LlmClients::new(Arc::new(small), Arc::new(large)));
    }

    let _ = (settings, timeout);
    Err(ConfigError::MissingClient(
        "enable either [azure_openai] or [openai] in the configuration".to_string(),
    ))
}
