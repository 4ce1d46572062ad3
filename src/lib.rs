// Library facade: incremental feature computation over sensor time series.
// A run builds the feature topology and the time-sliced dependency graph,
// resolves what the cache already holds and calculates only the rest.

pub mod compute;
pub mod error;
pub mod features;
pub mod graph;
pub mod io;
pub mod pipeline;
pub mod time;
pub mod types;

pub use compute::{CalculationEngine, CalculationWarning, MissingSet, Resolver};
pub use error::{ConfigError, FeatureCalculationError, PipelineError, StoreError};
pub use features::{FeatureDefinition, FeatureRegistry, FunctionLibrary, InputSpec};
pub use graph::RunContext;
pub use pipeline::{FeatureCalculator, PipelineConfig, PipelineManager, Profile, RunReport};
pub use types::{DataPoint, Interval, SourceKind, Value};

/// Crate version, reported by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
