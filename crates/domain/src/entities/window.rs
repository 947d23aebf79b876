use crate::errors::{DomainError, DomainResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Half-open line range `[start, end)`, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineSpan {
    pub start: u32,
    pub end: u32,
}

impl LineSpan {
    pub fn new(start: u32, end: u32) -> DomainResult<Self> {
        if start < 1 || start >= end {
            return Err(DomainError::InvalidSpan { start, end });
        }
        Ok(Self { start, end })
    }

    /// Span covering exactly one line.
    pub fn line(line: u32) -> Self {
        let start = line.max(1);
        Self {
            start,
            end: start + 1,
        }
    }

    /// Last line covered by the span.
    pub fn last_line(&self) -> u32 {
        self.end - 1
    }

    pub fn len(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start && line < self.end
    }
}

/// Per-file aggregate of kept hits, the unit of triage and analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateFileWindow {
    pub file: PathBuf,
    pub spans: Vec<LineSpan>,
    /// Numbered excerpt sent to the model, bounded by the token budget.
    pub context: String,
    pub hit_count: usize,
    /// Mean per-hit weight in `[0, 1]`.
    pub weight: f32,
    /// SHA-256 hex of the full file content.
    pub content_hash: String,
    /// Distinct lines with kept hits, ascending.
    pub matched_lines: Vec<u32>,
    /// Source text of each entry in `matched_lines`, trimmed.
    pub matched_text: Vec<String>,
    pub language: Option<String>,
}

impl CandidateFileWindow {
    pub fn file_display(&self) -> String {
        self.file.to_string_lossy().replace('\\', "/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_validation() {
        assert!(LineSpan::new(1, 2).is_ok());
        assert!(LineSpan::new(0, 2).is_err());
        assert!(LineSpan::new(5, 5).is_err());
        assert_eq!(LineSpan::line(10), LineSpan { start: 10, end: 11 });
        assert_eq!(LineSpan::line(10).last_line(), 10);
    }
}
