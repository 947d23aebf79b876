//! Domain Layer - ImpactScan data model and configuration
//!
//! Contains the values that flow between pipeline stages and the validated
//! configuration that drives them. Nothing here touches the network or spawns
//! processes:
//! - Entities: Intention, CandidateHit, CandidateFileWindow, TriageResult,
//!   ImpactAssessment, ImpactRunSummary
//! - Value Objects: ImpactLevel, ScoreThreshold
//! - Config: TOML-backed `ImpactScanConfig` with a validating factory
//! - Settings: secrets loaded once from `.env` and the environment

pub mod config;
pub mod entities;
pub mod errors;
pub mod settings;
pub mod value_objects;

pub use config::ImpactScanConfig;
pub use entities::{
    CandidateFileWindow, CandidateHit, ImpactAssessment, ImpactRunSummary, Intention, LineSpan,
    StageFailure, StageName, TokenUsage, TriageResult,
};
pub use errors::{DomainError, DomainResult};
pub use settings::Settings;
pub use value_objects::{ImpactLevel, ScoreThreshold};

/// Bumped whenever prompts or response handling change, so cached LLM
/// results from older builds are not reused.
pub const PIPELINE_VERSION: &str = "impactscan-pipeline-v1";

pub type Perspective = String;
pub type Score = f32;
