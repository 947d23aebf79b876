//! ImpactScan pipeline orchestration.
//!
//! [`Engine`] runs the stages in order and assembles the run summary:
//!
//! - **intention**: instruction to normalized goal and keywords
//! - scan and windowing over the target tree
//! - **triage**: cheap relevance score per window, threshold filter
//! - **analysis**: impact level, reason and perspective scores per retained window
//!
//! Triage and analysis share [`stage`]: limiter admission, per-call timeout,
//! validated replies with retry, bounded parallelism and cancellation.
//!
//! # Usage
//! ```no_run
//! use domain::{ImpactScanConfig, Settings};
//! use orchestrator::Engine;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ImpactScanConfig::load("impactscan.toml")?;
//!     let settings = Settings::load(&config);
//!     let engine = Engine::from_config(config, &settings)?;
//!     let summary = engine.run("improve caching layer", &["ttl".to_string()]).await?;
//!     println!("{} files assessed", summary.assessed);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod engine;
pub mod intention;
pub mod stage;
pub mod stream;
pub mod triage;
pub mod windows;

pub use analysis::{AnalysisOutcome, AnalysisReply, AnalysisStage};
pub use engine::{Engine, EngineBuilder};
pub use intention::IntentionExtractor;
pub use stage::{CallError, CallPolicy, Reply};
pub use stream::{AssessmentStream, BlockingAssessmentStream};
pub use triage::{TriageOutcome, TriageReply, TriageStage};
pub use windows::WindowSet;
pub use tokio_util::sync::CancellationToken;
