//! End-to-end pipeline: intention, scan, windows, triage, analysis, summary.

use crate::analysis::AnalysisStage;
use crate::intention::IntentionExtractor;
use crate::stage::CallPolicy;
use crate::stream::{AssessmentStream, BlockingAssessmentStream};
use crate::triage::TriageStage;
use crate::windows::build_windows;
use cache::{CacheStore, MemoryCacheStore, NoopCacheStore, SledCacheStore};
use chrono::Utc;
use common::{ConfigError, ImpactError, ImpactResult, OperationTimer};
use domain::{
    CandidateFileWindow, CandidateHit, ImpactAssessment, ImpactRunSummary, ImpactScanConfig,
    Settings,
};
use llm::{build_clients, LlmClients, RateLimiter, RateLimits, SharedClient};
use preprocess::FilePreprocessor;
use scanner::{HitSource, RipgrepScanner};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Assessments buffered per unit of analysis parallelism before a slow
/// stream consumer applies backpressure.
const STREAM_BUFFER_PER_WORKER: usize = 2;

/// Configured pipeline. Cheap to clone; every clone shares the cache and
/// rate limiter.
#[derive(Clone)]
pub struct Engine {
    config: Arc<ImpactScanConfig>,
    clients: LlmClients,
    cache: Arc<dyn CacheStore>,
    hit_source: Arc<dyn HitSource>,
    limiter: RateLimiter,
    preprocessor: Arc<FilePreprocessor>,
}

pub struct EngineBuilder {
    config: ImpactScanConfig,
    small: Option<SharedClient>,
    large: Option<SharedClient>,
    cache: Option<Arc<dyn CacheStore>>,
    hit_source: Option<Arc<dyn HitSource>>,
    limiter: Option<RateLimiter>,
}

impl EngineBuilder {
    /// Client for intention extraction and triage.
    pub fn small_client(mut self, client: SharedClient) -> Self {
        self.small = Some(client);
        self
    }

    /// Client for deep analysis.
    pub fn large_client(mut self, client: SharedClient) -> Self {
        self.large = Some(client);
        self
    }

    pub fn clients(self, clients: LlmClients) -> Self {
        self.small_client(clients.small).large_client(clients.large)
    }

    pub fn cache_store(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn hit_source(mut self, source: Arc<dyn HitSource>) -> Self {
        self.hit_source = Some(source);
        self
    }

    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn build(self) -> ImpactResult<Engine> {
        let config = self.config.validated()?;
        let small = self
            .small
            .ok_or_else(|| ConfigError::MissingClient("small".to_string()))?;
        let large = self
            .large
            .ok_or_else(|| ConfigError::MissingClient("large".to_string()))?;

        let cache = self.cache.unwrap_or_else(|| default_cache(&config));
        let hit_source = self
            .hit_source
            .unwrap_or_else(|| Arc::new(RipgrepScanner::from_config(&config)));
        let limiter = self.limiter.unwrap_or_else(|| {
            RateLimiter::new(RateLimits::new(
                config.analysis.rpm_limit,
                config.analysis.tpm_limit,
            ))
        });
        let preprocessor = Arc::new(FilePreprocessor::new(&config, Some(Arc::clone(&cache))));

        info!(
            target_dir = %config.target_dir.display(),
            small = small.name(),
            large = large.name(),
            cache = cache.name(),
            "engine ready"
        );

        Ok(Engine {
            config: Arc::new(config),
            clients: LlmClients::new(small, large),
            cache,
            hit_source,
            limiter,
            preprocessor,
        })
    }
}

fn default_cache(config: &ImpactScanConfig) -> Arc<dyn CacheStore> {
    if config.cache.enabled {
        Arc::new(MemoryCacheStore::new())
    } else {
        Arc::new(NoopCacheStore)
    }
}

impl Engine {
    pub fn builder(config: ImpactScanConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            small: None,
            large: None,
            cache: None,
            hit_source: None,
            limiter: None,
        }
    }

    /// Wires the ripgrep scanner, the configured cache backend and provider
    /// adapters built from `settings`.
    pub fn from_config(config: ImpactScanConfig, settings: &Settings) -> ImpactResult<Self> {
        let clients = build_clients(&config, settings)?;
        let cache: Arc<dyn CacheStore> = match (&config.cache.dir, config.cache.enabled) {
            (_, false) => Arc::new(NoopCacheStore),
            (Some(dir), true) => Arc::new(SledCacheStore::open(dir)?),
            (None, true) => Arc::new(MemoryCacheStore::new()),
        };
        Self::builder(config).clients(clients).cache_store(cache).build()
    }

    pub fn config(&self) -> &ImpactScanConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    pub async fn run(&self, instruction: &str, extra_keywords: &[String]) -> ImpactResult<ImpactRunSummary> {
        self.run_with_cancel(instruction, extra_keywords, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancel(
        &self,
        instruction: &str,
        extra_keywords: &[String],
        cancel: CancellationToken,
    ) -> ImpactResult<ImpactRunSummary> {
        self.execute(instruction, extra_keywords, &cancel, None).await
    }

    /// Starts a run on the current runtime and yields assessments as they
    /// complete. Must be called from within a tokio runtime.
    pub fn stream(&self, instruction: impl Into<String>, extra_keywords: Vec<String>) -> AssessmentStream {
        let capacity = self.config.analysis.parallelism.max(1) * STREAM_BUFFER_PER_WORKER;
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let engine = self.clone();
        let instruction = instruction.into();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            engine
                .execute(&instruction, &extra_keywords, &token, Some(tx))
                .await
        });
        AssessmentStream::new(rx, task, cancel)
    }

    /// Batch run on a private runtime.
    pub fn run_blocking(&self, instruction: &str, extra_keywords: &[String]) -> ImpactResult<ImpactRunSummary> {
        let runtime = build_runtime()?;
        runtime.block_on(self.run(instruction, extra_keywords))
    }

    /// Streaming run on a private runtime owned by the returned iterator.
    pub fn stream_blocking(
        &self,
        instruction: impl Into<String>,
        extra_keywords: Vec<String>,
    ) -> ImpactResult<BlockingAssessmentStream> {
        let runtime = build_runtime()?;
        let inner = {
            let _guard = runtime.enter();
            self.stream(instruction, extra_keywords)
        };
        Ok(BlockingAssessmentStream::new(runtime, inner))
    }

    async fn execute(
        &self,
        instruction: &str,
        extra_keywords: &[String],
        cancel: &CancellationToken,
        sink: Option<mpsc::Sender<ImpactAssessment>>,
    ) -> ImpactResult<ImpactRunSummary> {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut timer = OperationTimer::new("impact_run");
        let result = self
            .execute_stages(instruction, extra_keywords, cancel, sink, started_at, started)
            .await;

        match &result {
            Ok(summary) => {
                timer.add_field("candidate_windows", summary.candidate_windows);
                timer.add_field("assessed", summary.assessed);
                timer.add_field("failed", summary.failed);
                timer.add_field("total_tokens", summary.token_usage.total_tokens);
                timer.finish();
            }
            Err(e) => timer.finish_with_error(&e.to_string()),
        }
        result
    }

    async fn execute_stages(
        &self,
        instruction: &str,
        extra_keywords: &[String],
        cancel: &CancellationToken,
        sink: Option<mpsc::Sender<ImpactAssessment>>,
        started_at: chrono::DateTime<Utc>,
        started: Instant,
    ) -> ImpactResult<ImpactRunSummary> {
        let config = self.config.as_ref();
        let policy = CallPolicy::from_config(config, self.limiter.clone());

        let extractor = IntentionExtractor::new(
            Arc::clone(&self.clients.small),
            policy.clone(),
            config.analysis.temperature,
        );
        let (intention, intention_usage) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
            extracted = extractor.extract_with_usage(instruction, extra_keywords) => extracted?,
        };
        let keywords = intention.keyword_list();

        let scan = self.scan(&keywords, cancel).await?;
        let scanned_files = scan.grouped.len();

        let window_set = build_windows(
            &config.target_dir,
            scan.grouped,
            Arc::clone(&self.preprocessor),
            config.parse_workers(),
            cancel,
        )
        .await?;
        info!(
            files = scanned_files,
            windows = window_set.windows.len(),
            dropped_hits = window_set.dropped_hits,
            "candidate windows built"
        );
        let windows = window_set.windows;

        let triage = TriageStage::new(
            Arc::clone(&self.clients.small),
            Arc::clone(&self.cache),
            policy.clone(),
            config,
        )
        .triage(&windows, &intention, cancel)
        .await?;

        let retained: Vec<CandidateFileWindow> = windows
            .iter()
            .filter(|w| triage.results.get(&w.file).is_some_and(|r| r.retained))
            .cloned()
            .collect();

        let analysis = AnalysisStage::new(
            Arc::clone(&self.clients.large),
            Arc::clone(&self.cache),
            policy,
            config,
        )
        .analyze(&retained, &intention, cancel, sink)
        .await?;

        let mut summary = ImpactRunSummary::empty(started_at);
        summary.intention_goal = intention.normalized_goal().to_string();
        summary.keywords = keywords;
        summary.scanned_files = scanned_files;
        summary.candidate_windows = windows.len();
        summary.triaged_in = triage.retained();
        summary.triaged_out = triage.results.len() - summary.triaged_in;
        summary.failed_triage = triage.failures.len();
        summary.assessed = analysis.assessments.len();
        summary.failed_analysis = analysis.failures.len();
        summary.failed = summary.failed_triage + summary.failed_analysis;
        summary.cache_hits = triage.cache_hits + analysis.cache_hits;
        summary.scan_warnings = scan.warnings + window_set.unreadable;

        let mut usage = intention_usage;
        usage += triage.usage;
        usage += analysis.usage;
        summary.token_usage = usage;

        summary.assessments = analysis.assessments;
        summary.failures = triage.failures;
        summary.failures.extend(analysis.failures);
        summary.sort_assessments();
        summary.duration = started.elapsed();

        if !summary.reconciles() {
            warn!(
                candidate_windows = summary.candidate_windows,
                failed = summary.failed,
                "run summary counts do not reconcile"
            );
        }
        info!(
            candidate_windows = summary.candidate_windows,
            triaged_in = summary.triaged_in,
            triaged_out = summary.triaged_out,
            assessed = summary.assessed,
            failed = summary.failed,
            cache_hits = summary.cache_hits,
            "run complete"
        );
        Ok(summary)
    }

    async fn scan(&self, keywords: &[String], cancel: &CancellationToken) -> ImpactResult<ScanResult> {
        let mut stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
            stream = self.hit_source.search(keywords) => stream?,
        };

        let mut grouped: BTreeMap<PathBuf, Vec<CandidateHit>> = BTreeMap::new();
        let mut hits = 0usize;
        let mut errors = 0usize;
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ImpactError::Cancelled),
                next = stream.next_hit() => next,
            };
            match next {
                Some(Ok(hit)) => {
                    hits += 1;
                    grouped.entry(hit.file.clone()).or_default().push(hit);
                }
                Some(Err(e)) if e.is_fatal() => return Err(e),
                Some(Err(e)) => {
                    warn!(error = %e, "skipping scan result");
                    errors += 1;
                }
                None => break,
            }
        }

        let warnings = stream.warnings() + errors;
        info!(hits, files = grouped.len(), warnings, "scan complete");
        Ok(ScanResult { grouped, warnings })
    }
}

struct ScanResult {
    grouped: BTreeMap<PathBuf, Vec<CandidateHit>>,
    warnings: usize,
}

fn build_runtime() -> ImpactResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ImpactError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::{CallableProvider, ChatResponse};
    use std::sync::Arc;

    fn client() -> SharedClient {
        Arc::new(CallableProvider::new(|_| Ok(ChatResponse::from_text("{}"))))
    }

    #[test]
    fn test_build_requires_both_clients() {
        let err = Engine::builder(ImpactScanConfig::for_target("."))
            .small_client(client())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ImpactError::Config(ConfigError::MissingClient(ref tier)) if tier == "large"));
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = ImpactScanConfig::for_target(".");
        config.analysis.parallelism = 0;
        let err = Engine::builder(config)
            .clients(LlmClients::single(client()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, ImpactError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_disabled_cache_defaults_to_noop() {
        let mut config = ImpactScanConfig::for_target(".");
        config.cache.enabled = false;
        let engine = Engine::builder(config)
            .clients(LlmClients::single(client()))
            .build()
            .unwrap();
        assert_eq!(engine.cache().name(), NoopCacheStore.name());
    }
}
