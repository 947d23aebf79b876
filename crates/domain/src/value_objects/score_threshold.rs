//! ScoreThreshold - relevance cut-off applied to triage scores

use crate::errors::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};

/// Minimum triage score a file needs to be sent to deep analysis.
///
/// The comparison is inclusive: a score equal to the threshold is retained.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct ScoreThreshold(f32);

impl ScoreThreshold {
    pub fn new(value: f32) -> DomainResult<Self> {
        if !(0.0..=1.0).contains(&value) {
            return Err(DomainError::InvalidScoreThreshold(value));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> f32 {
        self.0
    }

    pub fn meets_threshold(&self, score: f32) -> bool {
        score >= self.0
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            x if x <= 0.2 => "Very permissive - most matching files are analyzed",
            x if x <= 0.4 => "Permissive - somewhat related files are analyzed",
            x if x <= 0.6 => "Balanced - moderate relevance required",
            x if x <= 0.8 => "Strict - high relevance required",
            _ => "Very strict - only clearly impacted files are analyzed",
        }
    }
}

impl Default for ScoreThreshold {
    fn default() -> Self {
        Self(0.35)
    }
}
