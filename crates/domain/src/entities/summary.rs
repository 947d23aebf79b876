use super::assessment::ImpactAssessment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::path::PathBuf;
use std::time::Duration;

/// Token accounting reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.total_tokens == 0
    }
}

impl Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: Self) -> Self::Output {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Triage,
    Analysis,
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageName::Triage => f.write_str("triage"),
            StageName::Analysis => f.write_str("analysis"),
        }
    }
}

/// A file that could not be processed by a stage after all retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub file: PathBuf,
    pub stage: StageName,
    pub reason: String,
}

impl StageFailure {
    pub fn new(file: impl Into<PathBuf>, stage: StageName, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Aggregate outcome of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactRunSummary {
    pub started_at: DateTime<Utc>,
    pub intention_goal: String,
    pub keywords: Vec<String>,
    pub scanned_files: usize,
    pub candidate_windows: usize,
    pub triaged_in: usize,
    pub triaged_out: usize,
    pub assessed: usize,
    pub failed: usize,
    pub failed_triage: usize,
    pub failed_analysis: usize,
    pub cache_hits: usize,
    pub scan_warnings: usize,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    pub token_usage: TokenUsage,
    pub assessments: Vec<ImpactAssessment>,
    pub failures: Vec<StageFailure>,
}

impl ImpactRunSummary {
    pub fn empty(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            intention_goal: String::new(),
            keywords: Vec::new(),
            scanned_files: 0,
            candidate_windows: 0,
            triaged_in: 0,
            triaged_out: 0,
            assessed: 0,
            failed: 0,
            failed_triage: 0,
            failed_analysis: 0,
            cache_hits: 0,
            scan_warnings: 0,
            duration: Duration::ZERO,
            token_usage: TokenUsage::default(),
            assessments: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Every candidate window ends in exactly one terminal state.
    pub fn reconciles(&self) -> bool {
        self.candidate_windows == self.triaged_in + self.triaged_out + self.failed_triage
            && self.triaged_in == self.assessed + self.failed_analysis
            && self.failed == self.failed_triage + self.failed_analysis
            && self.failures.len() == self.failed
            && self.assessments.len() == self.assessed
    }

    /// Sorts assessments into report order.
    pub fn sort_assessments(&mut self) {
        self.assessments.sort_by(ImpactAssessment::report_order);
        self.failures
            .sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.stage.cmp(&b.stage)));
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
