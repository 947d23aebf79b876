use super::wire::{self, CompletionRequest};
use super::{ChatRequest, ChatResponse, LlmClient};
use async_trait::async_trait;
use common::{ConfigError, LlmResult};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const PROVIDER: &str = "azure_openai";

/// Azure OpenAI deployment adapter. The deployment selects the model, so no
/// `model` field is sent in the body.
#[derive(Debug, Clone)]
pub struct AzureProvider {
    endpoint: String,
    api_key: String,
    deployment: String,
    api_version: String,
    client: Client,
}

impl AzureProvider {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        deployment: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let endpoint = endpoint.into();
        let api_key = api_key.into();
        if endpoint.is_empty() {
            return Err(ConfigError::invalid("azure_openai.endpoint", "cannot be empty"));
        }
        if api_key.is_empty() {
            return Err(ConfigError::MissingSecret("Azure OpenAI API key".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| {
                ConfigError::invalid("azure_openai", format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key,
            deployment: deployment.into(),
            api_version: api_version.into(),
            client,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.client = Client::builder().timeout(timeout).build().map_err(|e| {
            ConfigError::invalid("azure_openai", format!("failed to create HTTP client: {e}"))
        })?;
        Ok(self)
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    fn url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

#[async_trait]
impl LlmClient for AzureProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let start_time = Instant::now();
        let deployment = request.model_hint.as_deref().unwrap_or(&self.deployment);
        let body = CompletionRequest::from_chat(&request, None);

        debug!(deployment, "sending request to Azure OpenAI");

        let builder = self
            .client
            .post(self.url(deployment))
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body);

        let response = wire::send(PROVIDER, builder).await?;

        info!(
            deployment,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            total_tokens = response.usage.total_tokens,
            "received response from Azure OpenAI"
        );
        Ok(response)
    }
}
