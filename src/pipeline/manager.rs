//! manager.rs
//! Runs one configured pipeline for one location at its latest recurrence.

use super::config::{PipelineConfig, Profile};
use crate::compute::{CalculationEngine, CalculationWarning, Resolver};
use crate::error::{ConfigError, PipelineError};
use crate::features::FeatureRegistry;
use crate::graph::RunContext;
use crate::io::{InputCache, OutputWriter};
use crate::time::format_timestamp;
use crate::types::{DataPoint, Interval};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// Result of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub runtime: i64,
    /// Points of each pipeline output at the run time; empty when none was produced.
    pub outputs: BTreeMap<String, Vec<DataPoint>>,
    pub warnings: Vec<CalculationWarning>,
}

pub struct PipelineManager<'a> {
    location_id: String,
    pipeline: PipelineConfig,
    registry: &'a FeatureRegistry,
    profile: Profile,
    forced_time: Option<DateTime<Utc>>,
    force_recompute: BTreeSet<String>,
    ctx: RunContext,
}

impl<'a> PipelineManager<'a> {
    pub fn new(location_id: impl Into<String>, pipeline: PipelineConfig, registry: &'a FeatureRegistry) -> Self {
        Self {
            location_id: location_id.into(),
            pipeline,
            registry,
            profile: Profile::default(),
            forced_time: None,
            force_recompute: BTreeSet::new(),
            ctx: RunContext::new(),
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = profile;
        self
    }

    /// Runs as if the current time were `time`.
    pub fn with_forced_time(mut self, time: DateTime<Utc>) -> Self {
        self.forced_time = Some(time);
        self
    }

    /// Sources whose cached values are ignored and recalculated.
    pub fn with_force_recompute<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.force_recompute = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Graphs of the last run.
    pub fn context(&self) -> &RunContext { &self.ctx }

    /// The latest recurrence boundary at or before now.
    ///
    /// Boundaries are local midnight in the profile's timezone plus the recurrence
    /// offset, stepped by whole periods in either direction.
    pub fn calculate_runtime(&self) -> Result<i64, PipelineError> {
        let period = self.pipeline.recurrence.period();
        if period <= 0 {
            return Err(ConfigError::Invalid(format!(
                "pipeline '{}' has a non-positive period {}",
                self.pipeline.name, period
            ))
            .into());
        }
        let tz = self.profile.timezone_for(&self.location_id)?;
        let now = self.forced_time.unwrap_or_else(Utc::now);

        let local_day = now.with_timezone(&tz).date_naive();
        let midnight = tz
            .from_local_datetime(&local_day.and_time(NaiveTime::MIN))
            .earliest()
            .ok_or_else(|| ConfigError::Invalid(format!("no local midnight on {} in {}", local_day, tz)))?;

        let base = midnight.timestamp() + self.pipeline.recurrence.offset();
        let runtime = base + (now.timestamp() - base).div_euclid(period) * period;
        log::debug!("Calculated time {} with period {}", runtime, period);
        Ok(runtime)
    }

    /// Brings every requested source up to date for the latest runtime.
    ///
    /// The writer is closed whether or not the run succeeds.
    pub fn run(&mut self, cache: &mut dyn InputCache, writer: &mut dyn OutputWriter) -> Result<RunReport, PipelineError> {
        log::info!("Running pipeline {} for location {}", self.pipeline.name, self.location_id);

        let result = self.execute(cache, writer);
        let closed = writer.close().map_err(|e| PipelineError::store("closing the output writer", e));

        match (result, closed) {
            (Ok(report), Ok(())) => {
                log::info!("Pipeline {} finished with {} warnings", self.pipeline.name, report.warnings.len());
                Ok(report)
            }
            (Err(e), _) | (Ok(_), Err(e)) => {
                log::error!("Pipeline {} for {} failed: {}", self.pipeline.name, self.location_id, e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, cache: &mut dyn InputCache, writer: &mut dyn OutputWriter) -> Result<RunReport, PipelineError> {
        let runtime = self.calculate_runtime()?;
        log::info!("Calculated runtime {}", format_timestamp(runtime));
        writer.set_descriptor(&format!("{}_{}", self.location_id, format_timestamp(runtime)));

        let span = Interval::new(runtime - self.pipeline.recurrence.period(), runtime);
        let sources = self.pipeline.requested_sources();

        self.ctx.reset();
        let order = self.ctx.build_feature_topology(self.registry, &sources)?;
        self.ctx.build_time_graph(self.registry, &sources, span)?;

        let mut missing = Resolver::new(self.registry, &self.force_recompute).resolve(&mut self.ctx, &order, cache)?;
        log::info!("Resolved dependencies, {} intervals to calculate", missing.len());

        let force_store = BTreeSet::new();
        let warnings = CalculationEngine::new(self.registry, &force_store).calculate_unmet(&mut missing, cache, writer)?;

        Ok(RunReport { runtime, outputs: self.collect_outputs(cache, runtime), warnings })
    }

    /// The value of each pipeline output at `runtime`. Parameters are not reported.
    fn collect_outputs(&self, cache: &dyn InputCache, runtime: i64) -> BTreeMap<String, Vec<DataPoint>> {
        self.pipeline
            .outputs
            .iter()
            .map(|output| (output.clone(), cache.get_at(output, runtime as f64).into_iter().collect()))
            .collect()
    }
}
