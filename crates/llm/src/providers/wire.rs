//! OpenAI-compatible chat completion wire format, shared by the OpenAI and
//! Azure adapters.

use super::{ChatMessage, ChatRequest, ChatResponse, TokenUsage};
use common::LlmError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<&'a serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<&'a [serde_json::Value]>,
}

impl<'a> CompletionRequest<'a> {
    pub fn from_chat(request: &'a ChatRequest, model: Option<&'a str>) -> Self {
        Self {
            model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_format.as_ref(),
            tools: request.tools.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ResponseMessage {
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

/// Maps a raw completion body onto the normalized response.
pub(crate) fn parse_completion(body: serde_json::Value) -> Result<ChatResponse, LlmError> {
    let parsed: CompletionResponse = serde_json::from_value(body.clone())
        .map_err(|e| LlmError::format(format!("unexpected completion body: {e}")))?;

    let text = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| LlmError::format("response contained no choices"))?;

    let usage = parsed
        .usage
        .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
        .unwrap_or_default();

    let json = crate::json::extract_json_object(&text);
    Ok(ChatResponse {
        text: Some(text),
        json,
        usage,
        raw: body,
    })
}

/// Maps a non-success HTTP status onto the error taxonomy.
pub(crate) fn status_error(provider: &str, status: u16, body: String) -> LlmError {
    match status {
        401 | 403 => LlmError::Authentication {
            provider: provider.to_string(),
            reason: format!("status {status}: {body}"),
        },
        _ => LlmError::Http {
            provider: provider.to_string(),
            status,
            body,
        },
    }
}

pub(crate) fn transport_error(provider: &str, error: reqwest::Error) -> LlmError {
    if error.is_timeout() {
        LlmError::Timeout {
            provider: provider.to_string(),
            after: std::time::Duration::ZERO,
        }
    } else {
        LlmError::Transport {
            provider: provider.to_string(),
            reason: error.to_string(),
        }
    }
}

/// Sends a prepared request and normalizes the reply.
pub(crate) async fn send(
    provider: &str,
    builder: reqwest::RequestBuilder,
) -> Result<ChatResponse, LlmError> {
    let response = builder
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::error!(provider, status = status.as_u16(), "chat completion failed");
        return Err(status_error(provider, status.as_u16(), body));
    }

    let body: serde_json::Value = response
        .json()
        .await
        .map_err(|e| LlmError::format(format!("invalid JSON body: {e}")))?;
    parse_completion(body)
}
