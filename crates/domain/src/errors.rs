//! Domain Errors - data model invariant violations

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error("Invalid score threshold: {0}, must be between 0.0 and 1.0")]
    InvalidScoreThreshold(f32),

    #[error("Score out of range: {field} = {value}, must be between 0.0 and 1.0")]
    ScoreOutOfRange { field: String, value: f32 },

    #[error("Invalid span: ({start}, {end}) - spans must satisfy 1 <= start < end")]
    InvalidSpan { start: u32, end: u32 },

    #[error("Unknown impact level: {0}")]
    UnknownImpactLevel(String),

    #[error("Missing perspective score: {0}")]
    MissingPerspective(String),

    #[error("Intention goal cannot be empty")]
    EmptyGoal,

    #[error("Intention must contain at least one keyword")]
    EmptyKeywords,

    #[error("Invalid hit: {0}")]
    InvalidHit(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn score(field: impl Into<String>, value: f32) -> Self {
        Self::ScoreOutOfRange {
            field: field.into(),
            value,
        }
    }
}

/// Check that a probability-like value lies in `[0, 1]`.
pub fn ensure_unit_interval(field: &str, value: f32) -> DomainResult<f32> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(DomainError::score(field, value))
    }
}
