//! Scheduled pipeline runs and ad-hoc backfills on top of the compute layer.
pub mod calculator;
pub mod config;
pub mod manager;

pub use calculator::FeatureCalculator;
pub use config::{load_pipelines, PipelineConfig, Profile, Recurrence};
pub use manager::{PipelineManager, RunReport};
