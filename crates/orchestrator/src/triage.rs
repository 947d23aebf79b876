use crate::stage::{call_with_retry, run_bounded, CallPolicy};
use cache::{CacheKey, CacheStore, NAMESPACE_TRIAGE};
use common::{ImpactResult, LlmError, LlmResult};
use domain::{
    CandidateFileWindow, ImpactScanConfig, Intention, ScoreThreshold, StageFailure, StageName,
    TokenUsage, TriageResult, PIPELINE_VERSION,
};
use llm::prompts::triage_messages;
use llm::{ChatRequest, ChatResponse, SharedClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Raw model verdict, cached before the window weight is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReply {
    pub score: f32,
    pub rationale: String,
}

#[derive(Debug, Default)]
pub struct TriageOutcome {
    pub results: BTreeMap<PathBuf, TriageResult>,
    pub failures: Vec<StageFailure>,
    pub usage: TokenUsage,
    pub cache_hits: usize,
}

impl TriageOutcome {
    pub fn retained(&self) -> usize {
        self.results.values().filter(|r| r.retained).count()
    }
}

/// Cheap relevance screen over every candidate window.
#[derive(Clone)]
pub struct TriageStage {
    client: SharedClient,
    cache: Arc<dyn CacheStore>,
    policy: CallPolicy,
    threshold: ScoreThreshold,
    parallelism: usize,
    max_tokens: u32,
    temperature: f32,
    cache_ttl: Option<Duration>,
}

enum ItemResult {
    Done {
        result: TriageResult,
        usage: TokenUsage,
        cached: bool,
    },
    Failed {
        file: PathBuf,
        reason: String,
    },
}

impl TriageStage {
    pub fn new(
        client: SharedClient,
        cache: Arc<dyn CacheStore>,
        policy: CallPolicy,
        config: &ImpactScanConfig,
    ) -> Self {
        Self {
            client,
            cache,
            policy,
            threshold: config.analysis.threshold(),
            parallelism: config.analysis.parallelism,
            max_tokens: config.analysis.triage_max_tokens,
            temperature: config.analysis.temperature,
            cache_ttl: config.cache.ttl(),
        }
    }

    pub async fn triage(
        &self,
        windows: &[CandidateFileWindow],
        intention: &Intention,
        cancel: &CancellationToken,
    ) -> ImpactResult<TriageOutcome> {
        let mut outcome = TriageOutcome::default();
        let keywords = intention.keyword_list();
        let intention_hash = intention.fingerprint();

        run_bounded(
            windows.iter().collect(),
            self.parallelism,
            cancel,
            |window| self.triage_one(window, intention, &keywords, &intention_hash),
            |item| {
                match item {
                    ItemResult::Done {
                        result,
                        usage,
                        cached,
                    } => {
                        outcome.usage += usage;
                        if cached {
                            outcome.cache_hits += 1;
                        }
                        outcome.results.insert(result.file.clone(), result);
                    }
                    ItemResult::Failed { file, reason } => {
                        error!(file = %file.display(), %reason, "triage failed");
                        outcome
                            .failures
                            .push(StageFailure::new(file, StageName::Triage, reason));
                    }
                }
                async {}
            },
        )
        .await?;

        info!(
            windows = windows.len(),
            retained = outcome.retained(),
            failed = outcome.failures.len(),
            cache_hits = outcome.cache_hits,
            "triage complete"
        );
        Ok(outcome)
    }

    async fn triage_one(
        &self,
        window: &CandidateFileWindow,
        intention: &Intention,
        keywords: &[String],
        intention_hash: &str,
    ) -> ItemResult {
        let key = triage_cache_key(&window.content_hash, intention_hash);

        let (reply, usage, cached) = match cache::get_json::<TriageReply>(self.cache.as_ref(), NAMESPACE_TRIAGE, &key) {
            Ok(Some(reply)) => {
                debug!(file = %window.file.display(), "triage cache hit");
                (reply, TokenUsage::default(), true)
            }
            other => {
                if let Err(e) = other {
                    warn!(file = %window.file.display(), error = %e, "triage cache read failed");
                }
                let request = ChatRequest::new(triage_messages(
                    intention.normalized_goal(),
                    keywords,
                    &window.file_display(),
                    &window.context,
                ))
                .json_mode()
                .with_temperature(self.temperature)
                .with_max_tokens(self.max_tokens);

                match call_with_retry(&self.policy, self.client.as_ref(), &request, parse_triage_reply).await {
                    Ok(reply) => {
                        if let Err(e) = cache::set_json(
                            self.cache.as_ref(),
                            NAMESPACE_TRIAGE,
                            &key,
                            &reply.value,
                            self.cache_ttl,
                        ) {
                            warn!(file = %window.file.display(), error = %e, "triage cache write failed");
                        }
                        (reply.value, reply.usage, false)
                    }
                    Err(e) => {
                        return ItemResult::Failed {
                            file: window.file.clone(),
                            reason: e.to_string(),
                        }
                    }
                }
            }
        };

        let effective = (reply.score * window.weight).clamp(0.0, 1.0);
        match TriageResult::new(window.file.clone(), effective, reply.rationale, self.threshold) {
            Ok(result) => ItemResult::Done {
                result,
                usage,
                cached,
            },
            Err(e) => ItemResult::Failed {
                file: window.file.clone(),
                reason: e.to_string(),
            },
        }
    }
}

pub fn triage_cache_key(content_hash: &str, intention_hash: &str) -> String {
    CacheKey::new()
        .part("content", content_hash)
        .part("intention", intention_hash)
        .part("pipeline", PIPELINE_VERSION)
        .part("stage", "triage")
        .build()
}

/// Expects `{"score": number in [0, 1], "rationale": text}`.
pub fn parse_triage_reply(response: &ChatResponse) -> LlmResult<TriageReply> {
    let payload = response
        .json_payload()
        .ok_or_else(|| LlmError::format("reply is not a JSON object"))?;
    let score = payload
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| LlmError::format("'score' must be a number"))?;
    if !(0.0..=1.0).contains(&score) {
        return Err(LlmError::format(format!("'score' {score} is outside [0, 1]")));
    }
    let rationale = payload
        .get("rationale")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(TriageReply {
        score: score as f32,
        rationale,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cache::MemoryCacheStore;
    use llm::{CallableProvider, RateLimiter, RetryConfig};
    use rstest::rstest;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn window(file: &str, weight: f32) -> CandidateFileWindow {
        CandidateFileWindow {
            file: PathBuf::from(file),
            spans: vec![domain::LineSpan::line(1)],
            context: format!("@@ lines 1-1 @@\n    1 | {file}\n"),
            hit_count: 1,
            weight,
            content_hash: format!("hash-{file}"),
            matched_lines: vec![1],
            matched_text: vec![file.to_string()],
            language: Some("rust".to_string()),
        }
    }

    /// Scores by file name found in the prompt.
    fn scorer(calls: Arc<AtomicU32>) -> CallableProvider {
        CallableProvider::new(move |req| {
            calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &req.messages[1].content;
            let score = if prompt.contains("File: a.rs") {
                0.60
            } else if prompt.contains("File: edge.rs") {
                0.35
            } else if prompt.contains("File: broken.rs") {
                return Ok(ChatResponse::from_text("no json here"));
            } else {
                0.10
            };
            Ok(ChatResponse::from_json(json!({"score": score, "rationale": "stub"})))
        })
    }

    fn stage(client: CallableProvider, cache: Arc<dyn CacheStore>) -> TriageStage {
        let config = ImpactScanConfig::for_target(".");
        let policy = CallPolicy {
            limiter: RateLimiter::unlimited(),
            retry: RetryConfig::immediate(1),
            timeout: Duration::from_secs(5),
            blocking: true,
        };
        TriageStage::new(Arc::new(client), cache, policy, &config)
    }

    fn intention() -> Intention {
        Intention::new("improve caching layer", ["cache", "ttl"]).unwrap()
    }

    #[tokio::test]
    async fn test_threshold_applies_inclusively_and_failures_are_isolated() {
        let calls = Arc::new(AtomicU32::new(0));
        let stage = stage(scorer(calls.clone()), Arc::new(MemoryCacheStore::new()));
        let windows = [window("a.rs", 1.0), window("b.rs", 1.0), window("edge.rs", 1.0), window("broken.rs", 1.0)];

        let outcome = stage
            .triage(&windows, &intention(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results[&PathBuf::from("a.rs")].retained);
        assert!(!outcome.results[&PathBuf::from("b.rs")].retained);
        assert!(outcome.results[&PathBuf::from("edge.rs")].retained);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].file, PathBuf::from("broken.rs"));
        assert_eq!(outcome.failures[0].stage, StageName::Triage);
        // broken.rs: one retry.
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_string_penalty_scales_score() {
        let stage = stage(scorer(Arc::new(AtomicU32::new(0))), Arc::new(MemoryCacheStore::new()));
        let outcome = stage
            .triage(&[window("a.rs", 0.5)], &intention(), &CancellationToken::new())
            .await
            .unwrap();
        let result = &outcome.results[&PathBuf::from("a.rs")];
        assert!((result.score - 0.30).abs() < 1e-6);
        assert!(!result.retained);
    }

    #[tokio::test]
    async fn test_second_run_is_served_from_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let cache: Arc<dyn CacheStore> = Arc::new(MemoryCacheStore::new());
        let stage = stage(scorer(calls.clone()), cache);
        let windows = [window("a.rs", 1.0), window("b.rs", 1.0)];

        let first = stage.triage(&windows, &intention(), &CancellationToken::new()).await.unwrap();
        let second = stage.triage(&windows, &intention(), &CancellationToken::new()).await.unwrap();

        assert_eq!(first.cache_hits, 0);
        assert_eq!(second.cache_hits, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.results, second.results);
    }

    #[rstest]
    #[case::missing_score(json!({"rationale": "x"}))]
    #[case::out_of_range(json!({"score": 1.2}))]
    #[case::not_a_number(json!({"score": "high"}))]
    fn test_rejects_malformed_replies(#[case] payload: serde_json::Value) {
        let err = parse_triage_reply(&ChatResponse::from_json(payload)).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_cache_key_depends_on_content_and_intention() {
        let a = triage_cache_key("h1", "i1");
        assert_eq!(a, triage_cache_key("h1", "i1"));
        assert_ne!(a, triage_cache_key("h2", "i1"));
        assert_ne!(a, triage_cache_key("h1", "i2"));
    }
}
