//! Value objects - immutable, validated scalars shared across stages

mod impact_level;
mod score_threshold;

pub use impact_level::ImpactLevel;
pub use score_threshold::ScoreThreshold;
