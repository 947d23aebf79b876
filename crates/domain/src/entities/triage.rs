use crate::errors::{ensure_unit_interval, DomainResult};
use crate::value_objects::ScoreThreshold;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Relevance verdict for one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    pub file: PathBuf,
    pub score: f32,
    pub retained: bool,
    pub rationale: String,
}

impl TriageResult {
    /// Builds the result and derives `retained` from the threshold.
    pub fn new(
        file: impl Into<PathBuf>,
        score: f32,
        rationale: impl Into<String>,
        threshold: ScoreThreshold,
    ) -> DomainResult<Self> {
        let score = ensure_unit_interval("score", score)?;
        Ok(Self {
            file: file.into(),
            score,
            retained: threshold.meets_threshold(score),
            rationale: rationale.into(),
        })
    }
}
