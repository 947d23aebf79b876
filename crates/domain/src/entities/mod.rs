//! Entities - values handed from one pipeline stage to the next

mod assessment;
mod hit;
mod intention;
mod summary;
mod triage;
mod window;

pub use assessment::ImpactAssessment;
pub use hit::CandidateHit;
pub use intention::Intention;
pub use summary::{ImpactRunSummary, StageFailure, StageName, TokenUsage};
pub use triage::TriageResult;
pub use window::{CandidateFileWindow, LineSpan};
