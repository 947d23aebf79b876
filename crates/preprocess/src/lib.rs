//! Hit preprocessing between the lexical scan and the LLM stages.
//!
//! - [`classifier`]: comment, string and `#if 0` range detection
//!   (tree-sitter, lexer and heuristic backends)
//! - [`noncode`]: [`classify_hit`] and the keep/drop [`HitPolicy`]
//! - [`window`]: span merging and the numbered context excerpt
//! - [`file`]: the per-file entry point used by the engine

pub mod classifier;
pub mod file;
pub mod language;
pub mod noncode;
pub mod tokens;
pub mod window;

pub use classifier::{NonCodeClassifier, RangeBackend};
pub use file::{FileOutcome, FilePreprocessor};
pub use language::Language;
pub use noncode::{classify_hit, ByteSpan, HitCategory, HitPolicy, NonCodeRanges};
pub use tokens::{estimate_tokens, truncate_to_tokens};
pub use window::{build_window, merge_spans, render_context, WeightedHit, WindowOptions};
