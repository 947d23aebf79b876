use crate::errors::{ensure_unit_interval, DomainError, DomainResult};
use crate::value_objects::ImpactLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Final verdict for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactAssessment {
    pub file: PathBuf,
    pub impact_level: ImpactLevel,
    pub reason: String,
    pub confidence: f32,
    /// Keyed by configured perspective, every value in `[0, 1]`.
    pub perspective_scores: BTreeMap<String, f32>,
    /// Matched source lines, in file order.
    pub lines: Vec<String>,
    pub num_occurrences: usize,
}

impl ImpactAssessment {
    /// Validates scores against the configured perspectives.
    ///
    /// Every perspective must be present; keys outside the configured set are
    /// discarded.
    pub fn new(
        file: impl Into<PathBuf>,
        impact_level: ImpactLevel,
        reason: impl Into<String>,
        confidence: f32,
        raw_scores: BTreeMap<String, f32>,
        perspectives: &[String],
    ) -> DomainResult<Self> {
        let confidence = ensure_unit_interval("confidence", confidence)?;

        let mut perspective_scores = BTreeMap::new();
        for perspective in perspectives {
            let value = raw_scores
                .get(perspective)
                .copied()
                .ok_or_else(|| DomainError::MissingPerspective(perspective.clone()))?;
            let value = ensure_unit_interval(perspective, value)?;
            perspective_scores.insert(perspective.clone(), value);
        }

        Ok(Self {
            file: file.into(),
            impact_level,
            reason: reason.into(),
            confidence,
            perspective_scores,
            lines: Vec::new(),
            num_occurrences: 0,
        })
    }

    pub fn with_occurrences(mut self, lines: Vec<String>, num_occurrences: usize) -> Self {
        self.lines = lines;
        self.num_occurrences = num_occurrences;
        self
    }

    pub fn file_display(&self) -> String {
        self.file.to_string_lossy().replace('\\', "/")
    }

    /// Report ordering: impact level descending, confidence descending, path.
    pub fn report_order(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.impact_level
            .cmp(&a.impact_level)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.file.cmp(&b.file))
    }
}
