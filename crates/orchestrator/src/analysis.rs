use crate::stage::{call_with_retry, run_bounded, CallPolicy};
use cache::{CacheKey, CacheStore, NAMESPACE_ANALYSIS};
use common::{ImpactError, ImpactResult, LlmError, LlmResult};
use domain::{
    CandidateFileWindow, ImpactAssessment, ImpactLevel, ImpactScanConfig, Intention, StageFailure,
    StageName, TokenUsage, PIPELINE_VERSION,
};
use llm::prompts::analysis_messages;
use llm::{ChatRequest, ChatResponse, SharedClient};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Validated model verdict, independent of the window it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReply {
    pub impact_level: ImpactLevel,
    pub reason: String,
    pub confidence: f32,
    pub perspective_scores: BTreeMap<String, f32>,
}

impl AnalysisReply {
    fn into_assessment(self, window: &CandidateFileWindow, perspectives: &[String]) -> ImpactResult<ImpactAssessment> {
        ImpactAssessment::new(
            window.file.clone(),
            self.impact_level,
            self.reason,
            self.confidence,
            self.perspective_scores,
            perspectives,
        )
        .map(|a| a.with_occurrences(window.matched_text.clone(), window.hit_count))
        .map_err(|e| ImpactError::response_format("analysis", e.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct AnalysisOutcome {
    pub assessments: Vec<ImpactAssessment>,
    pub failures: Vec<StageFailure>,
    pub usage: TokenUsage,
    pub cache_hits: usize,
}

/// Deep per-file assessment of the windows retained by triage.
#[derive(Clone)]
pub struct AnalysisStage {
    client: SharedClient,
    cache: Arc<dyn CacheStore>,
    policy: CallPolicy,
    perspectives: Vec<String>,
    parallelism: usize,
    max_tokens: u32,
    temperature: f32,
    cache_ttl: Option<Duration>,
}

enum ItemResult {
    Done {
        assessment: ImpactAssessment,
        usage: TokenUsage,
        cached: bool,
    },
    Failed {
        file: PathBuf,
        reason: String,
    },
}

impl AnalysisStage {
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
            perspectives: config.analysis.perspectives.clone(),
            parallelism: config.analysis.parallelism,
            max_tokens: config.analysis.analysis_max_tokens,
            temperature: config.analysis.temperature,
            cache_ttl: config.cache.ttl(),
        }
    }

    /// Assesses every window. When `sink` is given, each assessment is sent
    /// as soon as it is produced; a closed receiver is not an error.
    pub async fn analyze(
        &self,
        windows: &[CandidateFileWindow],
        intention: &Intention,
        cancel: &CancellationToken,
        sink: Option<mpsc::Sender<ImpactAssessment>>,
    ) -> ImpactResult<AnalysisOutcome> {
        let mut outcome = AnalysisOutcome::default();
        let keywords = &intention.keyword_list();
        let intention_hash = &intention.fingerprint();
        let mut sorted_perspectives = self.perspectives.clone();
        sorted_perspectives.sort();
        let sorted_perspectives = &sorted_perspectives;
        let sink = sink.as_ref();

        run_bounded(
            windows.iter().collect(),
            self.parallelism,
            cancel,
            move |window| async move {
                let item = self
                    .analyze_one(window, intention, keywords, intention_hash, sorted_perspectives)
                    .await;
                if let (Some(tx), ItemResult::Done { assessment, .. }) = (sink, &item) {
                    if tx.send(assessment.clone()).await.is_err() {
                        debug!("assessment receiver closed");
                    }
                }
                item
            },
            |item| {
                match item {
                    ItemResult::Done {
                        assessment,
                        usage,
                        cached,
                    } => {
                        outcome.usage += usage;
                        if cached {
                            outcome.cache_hits += 1;
                        }
                        outcome.assessments.push(assessment);
                    }
                    ItemResult::Failed { file, reason } => {
                        error!(file = %file.display(), %reason, "analysis failed");
                        outcome
                            .failures
                            .push(StageFailure::new(file, StageName::Analysis, reason));
                    }
                }
                async {}
            },
        )
        .await?;

        info!(
            windows = windows.len(),
            assessed = outcome.assessments.len(),
            failed = outcome.failures.len(),
            cache_hits = outcome.cache_hits,
            "analysis complete"
        );
        Ok(outcome)
    }

    async fn analyze_one(
        &self,
        window: &CandidateFileWindow,
        intention: &Intention,
        keywords: &[String],
        intention_hash: &str,
        sorted_perspectives: &[String],
    ) -> ItemResult {
        let key = analysis_cache_key(&window.content_hash, intention_hash, sorted_perspectives);
        let failed = |file: &Path, reason: String| ItemResult::Failed {
            file: file.to_path_buf(),
            reason,
        };

        if let Some(reply) = self.cached(&key, &window.file) {
            debug!(file = %window.file.display(), "analysis cache hit");
            return match reply.into_assessment(window, &self.perspectives) {
                Ok(assessment) => ItemResult::Done {
                    assessment,
                    usage: TokenUsage::default(),
                    cached: true,
                },
                Err(e) => failed(&window.file, e.to_string()),
            };
        }

        let request = ChatRequest::new(analysis_messages(
            intention.normalized_goal(),
            keywords,
            &window.file_display(),
            &window.matched_lines,
            &window.context,
            &self.perspectives,
        ))
        .json_mode()
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let parse = |response: &ChatResponse| parse_analysis_reply(response, &self.perspectives);
        let reply = match call_with_retry(&self.policy, self.client.as_ref(), &request, parse).await {
            Ok(reply) => reply,
            Err(e) => return failed(&window.file, e.to_string()),
        };

        if let Err(e) = cache::set_json(self.cache.as_ref(), NAMESPACE_ANALYSIS, &key, &reply.value, self.cache_ttl) {
            warn!(file = %window.file.display(), error = %e, "analysis cache write failed");
        }

        match reply.value.into_assessment(window, &self.perspectives) {
            Ok(assessment) => ItemResult::Done {
                assessment,
                usage: reply.usage,
                cached: false,
            },
            Err(e) => failed(&window.file, e.to_string()),
        }
    }

    fn cached(&self, key: &str, file: &Path) -> Option<AnalysisReply> {
        match cache::get_json::<AnalysisReply>(self.cache.as_ref(), NAMESPACE_ANALYSIS, key) {
            Ok(hit) => hit,
            Err(e) => {
                warn!(file = %file.display(), error = %e, "analysis cache read failed");
                None
            }
        }
    }
}

pub fn analysis_cache_key(content_hash: &str, intention_hash: &str, sorted_perspectives: &[String]) -> String {
    CacheKey::new()
        .part("content", content_hash)
        .part("intention", intention_hash)
        .list("perspectives", sorted_perspectives)
        .part("pipeline", PIPELINE_VERSION)
        .part("stage", "analysis")
        .build()
}

/// Validates an analysis reply. Unknown perspective keys are discarded;
/// missing or out-of-range ones reject the reply.
pub fn parse_analysis_reply(response: &ChatResponse, perspectives: &[String]) -> LlmResult<AnalysisReply> {
    let payload = response
        .json_payload()
        .ok_or_else(|| LlmError::format("reply is not a JSON object"))?;

    let impact_level = payload
        .get("impact_level")
        .and_then(|v| v.as_str())
        .ok_or_else(|| LlmError::format("'impact_level' must be a string"))?
        .parse::<ImpactLevel>()
        .map_err(|e| LlmError::format(e.to_string()))?;

    let reason = payload
        .get("reason")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    let confidence = payload
        .get("confidence")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| LlmError::format("'confidence' must be a number"))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(LlmError::format(format!("'confidence' {confidence} is outside [0, 1]")));
    }

    let scores = payload
        .get("perspective_scores")
        .and_then(|v| v.as_object())
        .ok_or_else(|| LlmError::format("'perspective_scores' must be an object"))?;
    let mut perspective_scores = BTreeMap::new();
    for perspective in perspectives {
        let value = scores
            .get(perspective)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| LlmError::format(format!("perspective '{perspective}' is missing or not a number")))?;
        if !(0.0..=1.0).contains(&value) {
            return Err(LlmError::format(format!("perspective '{perspective}' score {value} is outside [0, 1]")));
        }
        perspective_scores.insert(perspective.clone(), value as f32);
    }

    Ok(AnalysisReply {
        impact_level,
        reason,
        confidence: confidence as f32,
        perspective_scores,
    })
}
