use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One keyword occurrence reported by the lexical scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateHit {
    /// Path relative to the scanned directory.
    pub file: PathBuf,
    /// 1-based line number.
    pub line: u32,
    /// 0-based byte column within the line.
    pub column: u32,
    /// 0-based absolute byte offset within the file.
    pub byte_offset: u64,
    pub matched_text: String,
    /// Surrounding lines (before, matched line, after) as reported by the scan.
    #[serde(default)]
    pub context_lines: Vec<String>,
}

impl CandidateHit {
    pub fn new(file: impl Into<PathBuf>, line: u32, column: u32, byte_offset: u64) -> Self {
        Self {
            file: file.into(),
            line: line.max(1),
            column,
            byte_offset,
            matched_text: String::new(),
            context_lines: Vec::new(),
        }
    }

    pub fn with_matched_text(mut self, text: impl Into<String>) -> Self {
        self.matched_text = text.into();
        self
    }

    pub fn with_context(mut self, lines: Vec<String>) -> Self {
        self.context_lines = lines;
        self
    }
}
