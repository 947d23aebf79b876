use async_trait::async_trait;
use common::LlmResult;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use domain::TokenUsage;

#[cfg(feature = "azure")]
pub mod azure_provider;
pub mod callable_provider;
#[cfg(feature = "openai")]
pub mod openai_provider;
pub(crate) mod wire;

#[cfg(feature = "azure")]
pub use azure_provider::AzureProvider;
pub use callable_provider::CallableProvider;
#[cfg(feature = "openai")]
pub use openai_provider::OpenAIProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Vendor-neutral chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    /// Passed through verbatim, e.g. `{"type": "json_object"}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Overrides the adapter's configured model or deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_hint: Option<String>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            response_format: None,
            tools: None,
            temperature: 0.2,
            max_tokens: None,
            model_hint: None,
        }
    }

    pub fn json_mode(mut self) -> Self {
        self.response_format = Some(serde_json::json!({ "type": "json_object" }));
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_model_hint(mut self, model: impl Into<String>) -> Self {
        self.model_hint = Some(model.into());
        self
    }

    /// Total characters across all message bodies.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.chars().count()).sum()
    }

    /// Admission estimate for the rate limiter: prompt chars / 4 plus the
    /// completion budget.
    pub fn estimated_tokens(&self) -> u64 {
        (self.prompt_chars() as u64).div_ceil(4) + u64::from(self.max_tokens.unwrap_or(0))
    }
}

/// Normalized provider reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: Option<String>,
    /// Parsed JSON object, when the adapter could extract one from `text`.
    pub json: Option<serde_json::Value>,
    pub usage: TokenUsage,
    pub raw: serde_json::Value,
}

impl ChatResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let json = crate::json::extract_json_object(&text);
        Self {
            text: Some(text),
            json,
            usage: TokenUsage::default(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn from_json(value: serde_json::Value) -> Self {
        Self {
            text: Some(value.to_string()),
            json: Some(value),
            usage: TokenUsage::default(),
            raw: serde_json::Value::Null,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// JSON payload, falling back to extraction from the text body.
    pub fn json_payload(&self) -> Option<serde_json::Value> {
        self.json
            .clone()
            .or_else(|| self.text.as_deref().and_then(crate::json::extract_json_object))
    }
}

/// Vendor-neutral LLM contract. Adapters are chosen at construction time.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logs and error context.
    fn name(&self) -> &str;

    async fn chat(&self, request: ChatRequest) -> LlmResult<ChatResponse>;
}
