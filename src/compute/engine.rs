//! engine.rs
//! Depth-first calculation of missing feature intervals.

use super::missing::MissingSet;
use crate::error::{FeatureCalculationError, PipelineError};
use crate::features::{FeatureDefinition, FeatureFn, FeatureInputs, FeatureRegistry, FunctionError};
use crate::graph::context::check_divisible;
use crate::io::{InputCache, OutputWriter};
use crate::types::{DataPoint, Interval};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

/// A non-fatal event raised while calculating one step of a feature.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationWarning {
    pub source_id: String,
    pub time: i64,
    pub window: i64,
    pub message: String,
}

impl fmt::Display for CalculationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} @ {} ({})] {}", self.source_id, self.time, self.window, self.message)
    }
}

/// Outcome of calling a feature function for one step.
#[derive(Debug)]
enum Invocation {
    Computed(Vec<DataPoint>),
    /// The function failed and the definition's default stands in.
    Recovered { points: Vec<DataPoint>, cause: FunctionError },
    Failed(Box<FeatureCalculationError>),
}

/// Mutable state threaded through one drain of the missing set.
struct Pass<'p> {
    missing: &'p mut MissingSet,
    cache: &'p mut dyn InputCache,
    writer: &'p mut dyn OutputWriter,
    warnings: Vec<CalculationWarning>,
}

pub struct CalculationEngine<'a> {
    registry: &'a FeatureRegistry,
    force_store: &'a BTreeSet<String>,
}

impl<'a> CalculationEngine<'a> {
    pub fn new(registry: &'a FeatureRegistry, force_store: &'a BTreeSet<String>) -> Self {
        Self { registry, force_store }
    }

    /// Calculates every interval in `missing` until it is empty.
    ///
    /// Stops at the first fatal error. Results already written to the cache or the
    /// writer before that point stay there.
    pub fn calculate_unmet(
        &self,
        missing: &mut MissingSet,
        cache: &mut dyn InputCache,
        writer: &mut dyn OutputWriter,
    ) -> Result<Vec<CalculationWarning>, PipelineError> {
        let mut pass = Pass { missing, cache, writer, warnings: Vec::new() };
        while let Some((source_id, interval)) = pass.missing.pop() {
            self.resolve(&mut pass, &source_id, interval)?;
        }
        Ok(pass.warnings)
    }

    /// Calculates `source_id` over `interval`, first resolving any missing calculated
    /// inputs the steps read.
    pub fn resolve_interval(
        &self,
        source_id: &str,
        interval: Interval,
        missing: &mut MissingSet,
        cache: &mut dyn InputCache,
        writer: &mut dyn OutputWriter,
    ) -> Result<Vec<CalculationWarning>, PipelineError> {
        let mut pass = Pass { missing, cache, writer, warnings: Vec::new() };
        self.resolve(&mut pass, source_id, interval)?;
        Ok(pass.warnings)
    }

    fn resolve(&self, pass: &mut Pass<'_>, source_id: &str, interval: Interval) -> Result<(), PipelineError> {
        let def = self
            .registry
            .definition(source_id)
            .ok_or_else(|| PipelineError::NotCalculated(source_id.to_string()))?;
        let function = self.registry.function_for(source_id)?;
        let window = def.effective_window(interval.len());
        check_divisible(source_id, interval, window)?;

        let persist = def.store || self.force_store.contains(source_id);
        let mut t = interval.start;
        while t + window <= interval.end {
            let time = t + window;
            log::debug!("Calculating {} for time {} (window {})", source_id, time, window);

            let inputs = self.gather_inputs(pass, def, time, window)?;

            let points = match self.invoke(source_id, def, function, time, window, inputs) {
                Invocation::Computed(points) => points,
                Invocation::Recovered { points, cause } => {
                    let warning = CalculationWarning {
                        source_id: source_id.to_string(),
                        time,
                        window,
                        message: format!("Used default value! ({})", cause),
                    };
                    log::warn!("{}", warning);
                    pass.warnings.push(warning);
                    points
                }
                Invocation::Failed(err) => return Err(PipelineError::Calculation(err)),
            };

            if persist {
                log::debug!("Storing {} at {} into the writer", source_id, time);
                pass.writer.add_entries(source_id, &points).map_err(|e| {
                    PipelineError::store(format!("storing {} at {}", source_id, time), e)
                })?;
            }
            pass.cache.add_entries(source_id, &points);
            pass.missing.remove(source_id, Interval::new(t, time));
            t = time;
        }
        Ok(())
    }

    /// Reads every declared input over the window ending at `time`, calculating
    /// missing calculated inputs first.
    fn gather_inputs(
        &self,
        pass: &mut Pass<'_>,
        def: &FeatureDefinition,
        time: i64,
        window: i64,
    ) -> Result<FeatureInputs, PipelineError> {
        let mut inputs = FeatureInputs::new();
        for input in &def.inputs {
            let (input_id, input_window) = input.resolve(window);
            let read = Interval::new(time - input_window, time);

            if self.registry.is_calculated(input_id) {
                for claimed in pass.missing.claim_overlapping(input_id, read) {
                    self.resolve(pass, input_id, claimed)?;
                }
            }
            inputs.extend(input_id, pass.cache.get(input_id, read));
        }
        Ok(inputs)
    }

    fn invoke(
        &self,
        source_id: &str,
        def: &FeatureDefinition,
        function: &FeatureFn,
        time: i64,
        window: i64,
        inputs: FeatureInputs,
    ) -> Invocation {
        match function(time, window, &inputs) {
            Ok(points) => Invocation::Computed(points),
            Err(cause) => match def.default.as_ref().filter(|v| !v.is_null()) {
                Some(default) => Invocation::Recovered {
                    points: vec![DataPoint::new(time as f64, window as f64, default.clone())],
                    cause,
                },
                None => Invocation::Failed(Box::new(FeatureCalculationError {
                    source_id: source_id.to_string(),
                    time,
                    window,
                    inputs,
                    cause,
                })),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::fixtures::*;
    use crate::features::FunctionLibrary;
    use crate::io::MemoryWriter;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_single_missing_step_is_computed() {
        let reg = avg_registry(true);
        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();
        missing.insert("avg_5m", Interval::new(300, 600));

        let none = BTreeSet::new();
        let warnings = CalculationEngine::new(&reg, &none)
            .calculate_unmet(&mut missing, &mut cache, &mut writer)
            .unwrap();

        // temp is 1..=15 at 60s steps; (300, 600] holds 6..=10.
        let expected = vec![DataPoint::new(600.0, 300.0, 8.0)];
        assert!(warnings.is_empty());
        assert!(missing.is_empty());
        assert_eq!(cache.get("avg_5m", Interval::new(0, 900)), expected);
        assert_eq!(writer.entries("avg_5m"), expected.as_slice());
    }

    #[test]
    fn test_unstored_feature_only_goes_to_cache() {
        let reg = avg_registry(false);
        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();
        missing.insert("avg_5m", Interval::new(0, 300));

        let none = BTreeSet::new();
        CalculationEngine::new(&reg, &none).calculate_unmet(&mut missing, &mut cache, &mut writer).unwrap();
        assert!(cache.contains("avg_5m", 300.0));
        assert!(writer.entries("avg_5m").is_empty());

        let forced: BTreeSet<String> = ["avg_5m".to_string()].into();
        missing.insert("avg_5m", Interval::new(300, 600));
        CalculationEngine::new(&reg, &forced).calculate_unmet(&mut missing, &mut cache, &mut writer).unwrap();
        assert_eq!(writer.entries("avg_5m").len(), 1);
    }

    #[test]
    fn test_default_recovers_every_step() {
        let mut reg = registry_with_failing();
        reg.define("flaky", FeatureDefinition::new(300, "fail").input("temp").with_default(-1));
        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();
        missing.insert("flaky", Interval::new(0, 900));

        let none = BTreeSet::new();
        let warnings = CalculationEngine::new(&reg, &none)
            .calculate_unmet(&mut missing, &mut cache, &mut writer)
            .unwrap();

        let values = cache.get("flaky", Interval::new(0, 900));
        assert_eq!(
            values,
            vec![
                DataPoint::new(300.0, 300.0, -1),
                DataPoint::new(600.0, 300.0, -1),
                DataPoint::new(900.0, 300.0, -1),
            ]
        );
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].to_string(), "[flaky @ 300 (300)] Used default value! (always fails)");
    }

    #[test]
    fn test_failure_without_default_is_fatal() {
        let mut reg = registry_with_failing();
        reg.define("broken", FeatureDefinition::new(300, "fail").input("temp"));
        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();
        missing.insert("broken", Interval::new(0, 300));

        let none = BTreeSet::new();
        let err = CalculationEngine::new(&reg, &none)
            .calculate_unmet(&mut missing, &mut cache, &mut writer)
            .unwrap_err();

        match err {
            PipelineError::Calculation(e) => {
                assert_eq!(e.source_id, "broken");
                assert_eq!((e.time, e.window), (300, 300));
                assert_eq!(e.cause, FunctionError::new("always fails"));
                assert_eq!(e.inputs.get("temp").map(|p| p.len()), Some(5));
            }
            other => panic!("Wrong error: {other}"),
        }
        assert!(!cache.contains("broken", 300.0));
    }

    #[test]
    fn test_divisibility_precondition() {
        let reg = avg_registry(false);
        let none = BTreeSet::new();
        let engine = CalculationEngine::new(&reg, &none);
        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();

        let err = engine
            .resolve_interval("avg_5m", Interval::new(0, 450), &mut missing, &mut cache, &mut writer)
            .unwrap_err();
        assert!(matches!(err, PipelineError::WindowNotDivisible { window: 300, .. }));

        assert!(engine
            .resolve_interval("avg_5m", Interval::new(0, 600), &mut missing, &mut cache, &mut writer)
            .is_ok());
        assert!(matches!(
            engine.resolve_interval("temp", Interval::new(0, 600), &mut missing, &mut cache, &mut writer),
            Err(PipelineError::NotCalculated(_))
        ));
    }

    #[test]
    fn test_missing_inputs_are_calculated_first_and_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let mut library = FunctionLibrary::builtin();
        library.register("counted_sum", move |time, window, inputs: &FeatureInputs| {
            counter.fetch_add(1, Ordering::SeqCst);
            crate::features::functions::sum(time, window, inputs)
        });
        let mut reg = FeatureRegistry::new(library);
        reg.define("sum_5m", FeatureDefinition::new(300, "counted_sum").input("temp"));
        reg.define("sum_15m", FeatureDefinition::new(900, "sum").windowed_input("sum_5m", 900));
        reg.define("max_15m", FeatureDefinition::new(900, "max").windowed_input("sum_5m", 900));

        let mut cache = temp_cache(0, 900);
        let mut writer = MemoryWriter::new();
        let mut missing = MissingSet::new();
        missing.insert("sum_15m", Interval::new(0, 900));
        missing.insert("max_15m", Interval::new(0, 900));
        for start in [0, 300, 600] {
            missing.insert("sum_5m", Interval::new(start, start + 300));
        }

        let none = BTreeSet::new();
        CalculationEngine::new(&reg, &none).calculate_unmet(&mut missing, &mut cache, &mut writer).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.get_at("sum_15m", 900.0).map(|p| p.value), Some(json!(120.0)));
        assert_eq!(cache.get_at("max_15m", 900.0).map(|p| p.value), Some(json!(65.0)));
    }
}
