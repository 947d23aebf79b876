use super::wire::{self, CompletionRequest};
use super::{ChatRequest, ChatResponse, LlmClient};
use async_trait::async_trait;
use common::{ConfigError, LlmResult};
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const PROVIDER: &str = "openai";

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    api_key: String,
    model: String,
    endpoint: String,
    client: Client,
}

impl OpenAIProvider {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        endpoint: Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(ConfigError::MissingSecret("OpenAI API key".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| ConfigError::invalid("openai", format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            model: model.into(),
            endpoint: endpoint
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string())
                .trim_end_matches('/')
                .to_string(),
            client,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::invalid("openai", format!("failed to create HTTP client: {e}")))?;
        Ok(self)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.endpoint)
    }
}

#[async_trait]
impl LlmClient for OpenAIProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse> {
        let start_time = Instant::now();
        let model = request.model_hint.as_deref().unwrap_or(&self.model);
        let body = CompletionRequest::from_chat(&request, Some(model));

        debug!(model, messages = request.messages.len(), "sending request to OpenAI");

        let builder = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        let response = wire::send(PROVIDER, builder).await?;

        info!(
            model,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            total_tokens = response.usage.total_tokens,
            "received response from OpenAI"
        );
        Ok(response)
    }
}
