//! calculator.rs
//! Backfills a list of features over an arbitrary time range.

use super::manager::RunReport;
use crate::compute::{CalculationEngine, Resolver};
use crate::error::PipelineError;
use crate::features::FeatureRegistry;
use crate::graph::RunContext;
use crate::io::{InputCache, OutputWriter};
use crate::time::{align_end, align_start};
use crate::types::{DataPoint, Interval};
use std::collections::{BTreeMap, BTreeSet};

pub struct FeatureCalculator<'a> {
    location_id: String,
    registry: &'a FeatureRegistry,
    features: Vec<String>,
    start: Option<i64>,
    end: i64,
    ctx: RunContext,
}

impl<'a> FeatureCalculator<'a> {
    /// Without a start, each feature is calculated for the single window ending at `end`.
    pub fn new(
        location_id: impl Into<String>,
        registry: &'a FeatureRegistry,
        features: Vec<String>,
        start: Option<i64>,
        end: i64,
    ) -> Self {
        Self { location_id: location_id.into(), registry, features, start, end, ctx: RunContext::new() }
    }

    /// The interval calculated for `source_id`, or `None` when it would be empty.
    ///
    /// The end is aligned down and the start aligned up to the feature's window.
    /// Zero-window features use the raw bounds and need an explicit start.
    pub fn request_interval(&self, source_id: &str) -> Result<Option<Interval>, PipelineError> {
        let def = self
            .registry
            .definition(source_id)
            .ok_or_else(|| PipelineError::NotCalculated(source_id.to_string()))?;

        let (start, end) = if def.window == 0 {
            let start = self.start.ok_or_else(|| PipelineError::WindowNotDivisible {
                source_id: source_id.to_string(),
                interval: Interval::new(self.end, self.end),
                window: 0,
            })?;
            (start, self.end)
        } else {
            let end = align_end(self.end, def.window, 0);
            let start = match self.start {
                Some(start) => align_start(start, def.window, 0),
                None => end - def.window,
            };
            (start, end)
        };

        if start >= end {
            log::debug!("Nothing to calculate for {} between {} and {}", source_id, start, end);
            return Ok(None);
        }
        Ok(Some(Interval::new(start, end)))
    }

    /// Calculates every feature over its aligned interval and force-stores all results.
    pub fn run(&mut self, cache: &mut dyn InputCache, writer: &mut dyn OutputWriter) -> Result<RunReport, PipelineError> {
        log::info!("Calculating {} features for location {}", self.features.len(), self.location_id);
        writer.set_descriptor(&self.location_id);

        let result = self.execute(cache, writer);
        let closed = writer.close().map_err(|e| PipelineError::store("closing the output writer", e));
        match (result, closed) {
            (Ok(report), Ok(())) => Ok(report),
            (Err(e), _) | (Ok(_), Err(e)) => {
                log::error!("Feature calculation for {} failed: {}", self.location_id, e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, cache: &mut dyn InputCache, writer: &mut dyn OutputWriter) -> Result<RunReport, PipelineError> {
        let mut requests: Vec<(&str, Interval)> = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            if let Some(interval) = self.request_interval(feature)? {
                log::debug!("Requesting {} over {}", feature, interval);
                requests.push((feature.as_str(), interval));
            }
        }

        let mut outputs: BTreeMap<String, Vec<DataPoint>> = BTreeMap::new();
        let Some(span) = requests
            .iter()
            .map(|&(_, i)| i)
            .reduce(|a, b| Interval::new(a.start.min(b.start), a.end.max(b.end)))
        else {
            return Ok(RunReport { runtime: self.end, outputs, warnings: Vec::new() });
        };

        self.ctx.reset();
        let order = self.ctx.build_feature_topology(self.registry, &self.features)?;
        self.ctx.build_time_graph_for(self.registry, &requests, span)?;

        let no_recompute = BTreeSet::new();
        let mut missing = Resolver::new(self.registry, &no_recompute).resolve(&mut self.ctx, &order, cache)?;

        let force_store: BTreeSet<String> = self.features.iter().cloned().collect();
        let warnings = CalculationEngine::new(self.registry, &force_store).calculate_unmet(&mut missing, cache, writer)?;
        log::info!("Calculated features, {} warnings", warnings.len());

        for &(feature, interval) in &requests {
            outputs.insert(feature.to_string(), cache.get(feature, interval));
        }
        Ok(RunReport { runtime: self.end, outputs, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::fixtures::{avg_registry, temp_cache};
    use crate::features::FeatureDefinition;
    use crate::io::MemoryWriter;
    use rstest::rstest;

    #[rstest]
    #[case::aligned(Some(0), 900, Some(Interval::new(0, 900)))]
    #[case::unaligned(Some(10), 1000, Some(Interval::new(300, 900)))]
    #[case::single_window(None, 1000, Some(Interval::new(600, 900)))]
    #[case::too_short(Some(310), 590, None)]
    fn test_request_interval(#[case] start: Option<i64>, #[case] end: i64, #[case] expected: Option<Interval>) {
        let reg = avg_registry(false);
        let calc = FeatureCalculator::new("loc", &reg, vec!["avg_5m".into()], start, end);
        assert_eq!(calc.request_interval("avg_5m").unwrap(), expected);
    }

    #[test]
    fn test_zero_window_needs_a_start() {
        let mut reg = avg_registry(false);
        reg.define("filled", FeatureDefinition::new(0, "fill_missing").input("temp"));

        let calc = FeatureCalculator::new("loc", &reg, vec!["filled".into()], None, 600);
        assert!(calc.request_interval("filled").is_err());
        let calc = FeatureCalculator::new("loc", &reg, vec!["filled".into()], Some(100), 600);
        assert_eq!(calc.request_interval("filled").unwrap(), Some(Interval::new(100, 600)));
    }

    #[test]
    fn test_raw_sources_cannot_be_backfilled() {
        let reg = avg_registry(false);
        let calc = FeatureCalculator::new("loc", &reg, vec!["temp".into()], None, 600);
        assert!(matches!(calc.request_interval("temp"), Err(PipelineError::NotCalculated(_))));
    }

    #[test]
    fn test_backfill_force_stores_results() {
        // Not marked for storage, but backfilled features always reach the writer.
        let reg = avg_registry(false);
        let mut cache = temp_cache(0, 1200);
        let mut writer = MemoryWriter::new();

        let mut calc = FeatureCalculator::new("loc-7", &reg, vec!["avg_5m".into()], Some(0), 1000);
        let report = calc.run(&mut cache, &mut writer).unwrap();

        let times: Vec<f64> = report.outputs["avg_5m"].iter().map(|p| p.timestamp).collect();
        assert_eq!(times, vec![300.0, 600.0, 900.0]);
        assert_eq!(writer.entries("avg_5m").len(), 3);
        assert_eq!(writer.descriptor(), "loc-7");
        assert!(writer.is_closed());
    }

    #[test]
    fn test_empty_range_closes_writer_without_work() {
        let reg = avg_registry(false);
        let mut cache = temp_cache(0, 600);
        let mut writer = MemoryWriter::new();

        let mut calc = FeatureCalculator::new("loc", &reg, vec!["avg_5m".into()], Some(310), 590);
        let report = calc.run(&mut cache, &mut writer).unwrap();
        assert!(report.outputs.is_empty());
        assert!(writer.sources().next().is_none());
        assert!(writer.is_closed());
    }
}
