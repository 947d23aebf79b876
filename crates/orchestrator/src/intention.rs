use crate::stage::{call_with_retry, CallError, CallPolicy};
use common::{ConfigError, ImpactError, ImpactResult, LlmError, LlmResult};
use domain::{Intention, TokenUsage};
use llm::prompts::intention_messages;
use llm::{ChatRequest, ChatResponse, SharedClient};
use tracing::info;

const INTENTION_MAX_TOKENS: u32 = 512;

/// Turns a free-form instruction into a normalized [`Intention`] with one
/// logical model call.
#[derive(Clone)]
pub struct IntentionExtractor {
    client: SharedClient,
    policy: CallPolicy,
    temperature: f32,
}

impl IntentionExtractor {
    pub fn new(client: SharedClient, policy: CallPolicy, temperature: f32) -> Self {
        Self {
            client,
            policy,
            temperature,
        }
    }

    pub async fn extract(&self, instruction: &str, extra_keywords: &[String]) -> ImpactResult<Intention> {
        self.extract_with_usage(instruction, extra_keywords)
            .await
            .map(|(intention, _)| intention)
    }

    pub async fn extract_with_usage(
        &self,
        instruction: &str,
        extra_keywords: &[String],
    ) -> ImpactResult<(Intention, TokenUsage)> {
        let instruction = instruction.trim();
        if instruction.is_empty() {
            return Err(ConfigError::invalid("instruction", "must not be blank").into());
        }

        let request = ChatRequest::new(intention_messages(instruction, extra_keywords))
            .json_mode()
            .with_temperature(self.temperature)
            .with_max_tokens(INTENTION_MAX_TOKENS);

        let reply = call_with_retry(&self.policy, self.client.as_ref(), &request, |response| {
            parse_intention(response, extra_keywords)
        })
        .await
        .map_err(|e| match e {
            CallError::Llm(LlmError::ResponseFormat { reason }) => {
                ImpactError::response_format("intention", reason)
            }
            CallError::Llm(e) => ImpactError::Llm(e),
            CallError::Limited(e) => e,
        })?;

        let intention = reply.value;
        info!(
            goal = intention.normalized_goal(),
            keywords = intention.keywords().len(),
            attempts = reply.attempts,
            "intention extracted"
        );
        Ok((intention, reply.usage))
    }
}

/// Expects `{"intention": "...", "keywords": ["..."]}`; extra keywords are
/// merged in before validation.
pub fn parse_intention(response: &ChatResponse, extra_keywords: &[String]) -> LlmResult<Intention> {
    let payload = response
        .json_payload()
        .ok_or_else(|| LlmError::format("reply is not a JSON object"))?;

    let goal = payload
        .get("intention")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .ok_or_else(|| LlmError::format("'intention' must be a non-empty string"))?;

    let keywords = payload
        .get("keywords")
        .and_then(|v| v.as_array())
        .ok_or_else(|| LlmError::format("'keywords' must be an array"))?;
    let mut merged = Vec::with_capacity(keywords.len() + extra_keywords.len());
    for keyword in keywords {
        let keyword = keyword
            .as_str()
            .ok_or_else(|| LlmError::format("'keywords' must contain only strings"))?;
        merged.push(keyword.to_string());
    }
    merged.extend(extra_keywords.iter().cloned());

    Intention::new(goal, merged).map_err(|e| LlmError::format(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{CallableProvider, RateLimiter, RetryConfig};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn extractor(client: CallableProvider) -> IntentionExtractor {
        let policy = CallPolicy {
            limiter: RateLimiter::unlimited(),
            retry: RetryConfig::immediate(2),
            timeout: Duration::from_secs(5),
            blocking: true,
        };
        IntentionExtractor::new(Arc::new(client), policy, 0.0)
    }

    fn extras() -> Vec<String> {
        vec!["Cache".to_string(), "ttl".to_string()]
    }

    #[tokio::test]
    async fn test_extras_merge_and_normalize() {
        let client = CallableProvider::new(|_| {
            Ok(ChatResponse::from_json(json!({
                "intention": "Improve the caching layer",
                "keywords": ["cache", " CacheStore "]
            })))
        });
        let intention = extractor(client)
            .extract("improve caching layer", &extras())
            .await
            .unwrap();
        assert_eq!(intention.normalized_goal(), "Improve the caching layer");
        assert_eq!(intention.keyword_list(), vec!["cache", "cachestore", "ttl"]);
    }

    #[tokio::test]
    async fn test_blank_instruction_is_config_error() {
        let client = CallableProvider::new(|_| Ok(ChatResponse::from_text("{}")));
        let err = extractor(client).extract("   ", &[]).await.unwrap_err();
        assert!(matches!(err, ImpactError::Config(_)));
    }

    #[tokio::test]
    async fn test_bad_schema_exhausts_retries_as_response_format() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let client = CallableProvider::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ChatResponse::from_json(json!({"intention": "x", "keywords": "cache"})))
        });
        let err = extractor(client).extract("do it", &[]).await.unwrap_err();
        assert!(matches!(err, ImpactError::ResponseFormat { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_exhausts_retries_as_llm_error() {
        let client = CallableProvider::new(|_| {
            Err(LlmError::Transport {
                provider: "stub".to_string(),
                reason: "connection reset".to_string(),
            })
        });
        let err = extractor(client).extract("do it", &[]).await.unwrap_err();
        assert!(matches!(err, ImpactError::Llm(LlmError::Transport { .. })));
    }

    #[test]
    fn test_empty_merged_keywords_rejected() {
        let response = ChatResponse::from_json(json!({"intention": "x", "keywords": ["  "]}));
        assert!(parse_intention(&response, &[]).unwrap_err().is_format());
    }
}
