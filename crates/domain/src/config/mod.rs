//! Run configuration loaded from TOML.
//!
//! Every section has serde defaults so a minimal file only needs
//! `target_dir`. Construction goes through [`ImpactScanConfig::validated`],
//! which reports the first offending field.

use crate::value_objects::ScoreThreshold;
use common::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactScanConfig {
    pub target_dir: PathBuf,

    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,

    #[serde(default = "default_exclude_globs")]
    pub exclude_globs: Vec<String>,

    #[serde(default)]
    pub ripgrep: RipgrepConfig,

    #[serde(default)]
    pub preprocess: PreprocessConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub azure_openai: AzureOpenAiConfig,

    #[serde(default)]
    pub openai: OpenAiConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Lexical pre-filter settings passed through to `rg`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RipgrepConfig {
    #[serde(default = "default_context_lines")]
    pub context_lines: u32,
    #[serde(default = "default_true")]
    pub fixed_strings: bool,
    #[serde(default = "default_true")]
    pub smart_case: bool,
    /// 0 lets ripgrep pick.
    #[serde(default)]
    pub threads: usize,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default = "default_rg_binary")]
    pub binary: String,
}

impl Default for RipgrepConfig {
    fn default() -> Self {
        Self {
            context_lines: default_context_lines(),
            fixed_strings: true,
            smart_case: true,
            threads: 0,
            include_hidden: false,
            binary: default_rg_binary(),
        }
    }
}

/// Backend used to locate comments, string literals and disabled blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalyzerKind {
    #[serde(rename = "tree-sitter", alias = "tree_sitter", alias = "treesitter")]
    TreeSitter,
    #[serde(rename = "lexer", alias = "pygments")]
    Lexer,
    #[serde(rename = "heuristics", alias = "heuristic")]
    Heuristics,
}

impl AnalyzerKind {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerKind::TreeSitter => "tree-sitter",
            AnalyzerKind::Lexer => "lexer",
            AnalyzerKind::Heuristics => "heuristics",
        }
    }
}

impl fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AnalyzerKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tree-sitter" | "tree_sitter" | "treesitter" => Ok(AnalyzerKind::TreeSitter),
            "lexer" | "pygments" => Ok(AnalyzerKind::Lexer),
            "heuristics" | "heuristic" => Ok(AnalyzerKind::Heuristics),
            other => Err(ConfigError::invalid(
                "preprocess.analyzer",
                format!("unknown analyzer '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessConfig {
    #[serde(default = "default_true")]
    pub drop_comment_lines: bool,
    #[serde(default = "default_analyzer")]
    pub analyzer: AnalyzerKind,
    #[serde(default = "default_true")]
    pub keep_string_literals: bool,
    #[serde(default = "default_string_weight_penalty")]
    pub string_weight_penalty: f32,
    #[serde(default = "default_true")]
    pub detect_if0_blocks: bool,
    #[serde(default = "default_true")]
    pub cache_noncode_ranges: bool,
    #[serde(default = "default_max_file_bytes_for_parse")]
    pub max_file_bytes_for_parse: u64,
    #[serde(default = "default_merge_window_lines")]
    pub merge_window_lines: u32,
    #[serde(default = "default_max_tokens_file_context")]
    pub max_tokens_file_context: usize,
    /// 0 means one worker per CPU.
    #[serde(default)]
    pub parse_workers: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            drop_comment_lines: true,
            analyzer: default_analyzer(),
            keep_string_literals: true,
            string_weight_penalty: default_string_weight_penalty(),
            detect_if0_blocks: true,
            cache_noncode_ranges: true,
            max_file_bytes_for_parse: default_max_file_bytes_for_parse(),
            merge_window_lines: default_merge_window_lines(),
            max_tokens_file_context: default_max_tokens_file_context(),
            parse_workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_perspectives")]
    pub perspectives: Vec<String>,
    #[serde(default = "default_triage_threshold")]
    pub triage_threshold: f32,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default = "default_rpm_limit")]
    pub rpm_limit: Option<u32>,
    #[serde(default = "default_tpm_limit")]
    pub tpm_limit: Option<u64>,
    #[serde(default = "default_true")]
    pub rate_limit_blocking: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_triage_max_tokens")]
    pub triage_max_tokens: u32,
    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl AnalysisConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Threshold as a value object. Falls back to the default when the raw
    /// value was never validated.
    pub fn threshold(&self) -> ScoreThreshold {
        ScoreThreshold::new(self.triage_threshold).unwrap_or_default()
    }

    /// Perspectives in sorted order, used for cache keys.
    pub fn sorted_perspectives(&self) -> Vec<String> {
        let mut sorted = self.perspectives.clone();
        sorted.sort();
        sorted
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            perspectives: default_perspectives(),
            triage_threshold: default_triage_threshold(),
            parallelism: default_parallelism(),
            rpm_limit: default_rpm_limit(),
            tpm_limit: default_tpm_limit(),
            rate_limit_blocking: true,
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            triage_max_tokens: default_triage_max_tokens(),
            analysis_max_tokens: default_analysis_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// On-disk store location; in-memory when absent.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Deployments {
    #[serde(default)]
    pub small: String,
    #[serde(default)]
    pub large: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureOpenAiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_azure_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_azure_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub deployments: Deployments,
}

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: String::new(),
            api_key_env: default_azure_key_env(),
            api_version: default_azure_api_version(),
            deployments: Deployments::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_openai_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub model_small: String,
    #[serde(default)]
    pub model_large: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key_env: default_openai_key_env(),
            base_url: default_openai_base_url(),
            model_small: String::new(),
            model_large: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_true")]
    pub write_csv: bool,
    #[serde(default = "default_true")]
    pub write_jsonl: bool,
    #[serde(default)]
    pub write_summary_md: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            write_csv: true,
            write_jsonl: true,
            write_summary_md: false,
        }
    }
}

impl ImpactScanConfig {
    /// Default configuration for `target_dir`.
    pub fn for_target(target_dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: target_dir.into(),
            include_globs: default_include_globs(),
            exclude_globs: default_exclude_globs(),
            ripgrep: RipgrepConfig::default(),
            preprocess: PreprocessConfig::default(),
            analysis: AnalysisConfig::default(),
            cache: CacheConfig::default(),
            azure_openai: AzureOpenAiConfig::default(),
            openai: OpenAiConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: ImpactScanConfig =
            toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validated()
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks every range and cross-field constraint.
    pub fn validated(self) -> ConfigResult<Self> {
        if self.target_dir.as_os_str().is_empty()
            || self.target_dir.to_string_lossy().trim().is_empty()
        {
            return Err(ConfigError::invalid("target_dir", "must not be blank"));
        }

        let p = &self.preprocess;
        if !(0.0..=1.0).contains(&p.string_weight_penalty) {
            return Err(ConfigError::invalid(
                "preprocess.string_weight_penalty",
                format!("{} is outside [0, 1]", p.string_weight_penalty),
            ));
        }
        if p.max_file_bytes_for_parse == 0 {
            return Err(ConfigError::invalid(
                "preprocess.max_file_bytes_for_parse",
                "must be greater than 0",
            ));
        }
        if p.merge_window_lines < 1 {
            return Err(ConfigError::invalid(
                "preprocess.merge_window_lines",
                "must be at least 1",
            ));
        }
        if p.max_tokens_file_context < 1 {
            return Err(ConfigError::invalid(
                "preprocess.max_tokens_file_context",
                "must be at least 1",
            ));
        }

        let a = &self.analysis;
        if a.perspectives.is_empty() {
            return Err(ConfigError::invalid(
                "analysis.perspectives",
                "at least one perspective is required",
            ));
        }
        let mut seen = HashSet::new();
        for perspective in &a.perspectives {
            if perspective.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "analysis.perspectives",
                    "perspective names must not be blank",
                ));
            }
            if !seen.insert(perspective.as_str()) {
                return Err(ConfigError::invalid(
                    "analysis.perspectives",
                    format!("duplicate perspective '{perspective}'"),
                ));
            }
        }
        if ScoreThreshold::new(a.triage_threshold).is_err() {
            return Err(ConfigError::invalid(
                "analysis.triage_threshold",
                format!("{} is outside [0, 1]", a.triage_threshold),
            ));
        }
        if a.parallelism < 1 {
            return Err(ConfigError::invalid(
                "analysis.parallelism",
                "must be at least 1",
            ));
        }
        if a.rpm_limit == Some(0) {
            return Err(ConfigError::invalid(
                "analysis.rpm_limit",
                "must be at least 1 or omitted",
            ));
        }
        if a.tpm_limit == Some(0) {
            return Err(ConfigError::invalid(
                "analysis.tpm_limit",
                "must be at least 1 or omitted",
            ));
        }
        if a.request_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "analysis.request_timeout_secs",
                "must be greater than 0",
            ));
        }
        if !(0.0..=2.0).contains(&a.temperature) {
            return Err(ConfigError::invalid(
                "analysis.temperature",
                format!("{} is outside [0, 2]", a.temperature),
            ));
        }

        if self.azure_openai.enabled {
            let az = &self.azure_openai;
            if az.endpoint.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "azure_openai.endpoint",
                    "required when azure_openai is enabled",
                ));
            }
            if az.deployments.small.trim().is_empty() || az.deployments.large.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "azure_openai.deployments",
                    "both small and large deployments are required",
                ));
            }
        }
        if self.openai.enabled {
            let oa = &self.openai;
            if oa.base_url.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "openai.base_url",
                    "required when openai is enabled",
                ));
            }
            if oa.model_small.trim().is_empty() || oa.model_large.trim().is_empty() {
                return Err(ConfigError::invalid(
                    "openai.model_small",
                    "both model_small and model_large are required",
                ));
            }
        }

        Ok(self)
    }

    /// Parse worker count with the CPU-count default resolved.
    pub fn parse_workers(&self) -> usize {
        match self.preprocess.parse_workers {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*".to_string()]
}

fn default_exclude_globs() -> Vec<String> {
    ["**/.git/**", "**/node_modules/**", "**/dist/**", "**/*.min.js"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_context_lines() -> u32 {
    12
}

fn default_rg_binary() -> String {
    "rg".to_string()
}

fn default_analyzer() -> AnalyzerKind {
    AnalyzerKind::TreeSitter
}

fn default_string_weight_penalty() -> f32 {
    0.15
}

fn default_max_file_bytes_for_parse() -> u64 {
    2_000_000
}

fn default_merge_window_lines() -> u32 {
    40
}

fn default_max_tokens_file_context() -> usize {
    2000
}

fn default_perspectives() -> Vec<String> {
    ["security", "backward_compatibility", "performance", "test_impact"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_triage_threshold() -> f32 {
    0.35
}

fn default_parallelism() -> usize {
    16
}

fn default_rpm_limit() -> Option<u32> {
    Some(900)
}

fn default_tpm_limit() -> Option<u64> {
    Some(1_000_000)
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_triage_max_tokens() -> u32 {
    256
}

fn default_analysis_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_cache_ttl_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_azure_key_env() -> String {
    "AZURE_OPENAI_API_KEY".to_string()
}

fn default_azure_api_version() -> String {
    "2024-06-01".to_string()
}

fn default_openai_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./reports")
}
