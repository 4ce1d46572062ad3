//! error.rs
//! Error taxonomy of a pipeline run.

use crate::features::{FeatureInputs, FunctionError};
use crate::types::Interval;
use std::path::PathBuf;
use thiserror::Error;

/// Failures of the input cache, its backing store, or an output writer.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed data: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Backend error: {0}")]
    Backend(String),
    #[error("Writer is already closed")]
    Closed,
}

/// Problems loading or interpreting configuration files.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read '{path}': {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("Cannot parse '{path}': {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A feature function failed and the feature has no default to fall back on.
#[derive(Error, Debug)]
#[error("Error calculating feature {source_id} for time {time} and window {window} ({cause})")]
pub struct FeatureCalculationError {
    pub source_id: String,
    pub time: i64,
    pub window: i64,
    /// Snapshot of the inputs the function was called with.
    pub inputs: FeatureInputs,
    #[source]
    pub cause: FunctionError,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Misconfiguration: a span cannot be split into whole windows.
    #[error("Interval {interval} of '{source_id}' is not divisible by its window of {window}s")]
    WindowNotDivisible { source_id: String, interval: Interval, window: i64 },

    #[error("Cyclic feature definition involving '{source_id}'")]
    CyclicDefinition { source_id: String },

    #[error("Feature '{source_id}' references unknown function '{function}'")]
    UnknownFunction { source_id: String, function: String },

    #[error("'{0}' has no feature definition and cannot be calculated")]
    NotCalculated(String),

    #[error("Store failure while {context}: {source}")]
    Store { context: String, source: StoreError },

    #[error(transparent)]
    Calculation(#[from] Box<FeatureCalculationError>),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PipelineError {
    pub(crate) fn store(context: impl Into<String>, source: StoreError) -> Self {
        PipelineError::Store { context: context.into(), source }
    }
}
