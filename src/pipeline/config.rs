//! config.rs
//! Pipeline and location profile configuration.

use crate::error::ConfigError;
use crate::features::definition::window_serde;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How often a pipeline fires: a bare period, or a period shifted by an offset from local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recurrence {
    Period(#[serde(with = "window_serde")] i64),
    Detailed {
        #[serde(with = "window_serde")]
        period: i64,
        #[serde(default, with = "window_serde")]
        offset: i64,
    },
}

impl Recurrence {
    pub fn period(&self) -> i64 {
        match *self {
            Recurrence::Period(period) | Recurrence::Detailed { period, .. } => period,
        }
    }

    pub fn offset(&self) -> i64 {
        match *self {
            Recurrence::Period(_) => 0,
            Recurrence::Detailed { offset, .. } => offset,
        }
    }
}

/// A named, recurring request for a set of output sources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Filled from the key of the pipelines file.
    #[serde(default, skip_serializing)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub recurrence: Recurrence,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub parameters: Vec<String>,
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, recurrence: Recurrence) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            recurrence,
            outputs: Vec::new(),
            parameters: Vec::new(),
        }
    }

    pub fn output(mut self, source_id: impl Into<String>) -> Self {
        self.outputs.push(source_id.into());
        self
    }

    pub fn parameter(mut self, source_id: impl Into<String>) -> Self {
        self.parameters.push(source_id.into());
        self
    }

    /// Outputs followed by parameters, in declaration order.
    pub fn requested_sources(&self) -> Vec<String> {
        self.outputs.iter().chain(&self.parameters).cloned().collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.recurrence.period() <= 0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline '{}' has a non-positive period {}",
                self.name,
                self.recurrence.period()
            )));
        }
        if self.outputs.is_empty() && self.parameters.is_empty() {
            return Err(ConfigError::Invalid(format!("pipeline '{}' requests no sources", self.name)));
        }
        Ok(())
    }
}

/// Loads a `{ "<name>": <pipeline>, ... }` JSON file.
pub fn load_pipelines(path: &Path) -> Result<BTreeMap<String, PipelineConfig>, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    let mut pipelines: BTreeMap<String, PipelineConfig> = serde_json::from_str(&content)
        .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
    for (name, pipeline) in pipelines.iter_mut() {
        pipeline.name = name.clone();
    }
    Ok(pipelines)
}

/// Per-location settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

impl Profile {
    pub fn with_timezone(timezone: impl Into<String>) -> Self {
        Self { timezone: Some(timezone.into()) }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// The configured timezone; otherwise Slovenian locations (`SI…`) use
    /// `Europe/Ljubljana` and every other location uses UTC.
    pub fn timezone_for(&self, location_id: &str) -> Result<Tz, ConfigError> {
        let name = match &self.timezone {
            Some(tz) => tz.as_str(),
            None if location_id.starts_with("SI") => "Europe/Ljubljana",
            None => "UTC",
        };
        name.parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", name)))
    }
}
