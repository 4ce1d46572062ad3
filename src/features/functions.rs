//! functions.rs
//! The feature function contract and a library of general-purpose functions.

use crate::types::{DataPoint, Value};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a feature function.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct FunctionError(pub String);

impl FunctionError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Ordered mapping from input source id to the points read for it.
///
/// Order follows the feature's declared inputs; single-input functions read `first()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeatureInputs {
    entries: Vec<(String, Vec<DataPoint>)>,
}

impl FeatureInputs {
    pub fn new() -> Self { Self::default() }

    /// Appends `points` to the list of `source_id`, creating it on first use.
    pub fn extend(&mut self, source_id: &str, points: impl IntoIterator<Item = DataPoint>) {
        match self.entries.iter_mut().find(|(id, _)| id == source_id) {
            Some((_, list)) => list.extend(points),
            None => self.entries.push((source_id.to_string(), points.into_iter().collect())),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&[DataPoint]> {
        self.entries.iter().find(|(id, _)| id == source_id).map(|(_, v)| v.as_slice())
    }

    pub fn first(&self) -> Option<&[DataPoint]> {
        self.entries.first().map(|(_, v)| v.as_slice())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[DataPoint])> {
        self.entries.iter().map(|(id, v)| (id.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn point_count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.len()).sum()
    }

    fn single(&self) -> Result<&[DataPoint], FunctionError> {
        self.first().ok_or_else(|| FunctionError::new("function requires one input"))
    }
}

/// `(time, window, inputs) -> points`. Must be pure with respect to its inputs.
pub type FeatureFn =
    Arc<dyn Fn(i64, i64, &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> + Send + Sync>;

/// Named feature functions available to feature definitions.
#[derive(Clone, Default)]
pub struct FunctionLibrary {
    functions: HashMap<String, FeatureFn>,
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("FunctionLibrary").field("functions", &names).finish()
    }
}

impl FunctionLibrary {
    /// An empty library.
    pub fn new() -> Self { Self::default() }

    /// A library pre-populated with the general-purpose functions of this module.
    pub fn builtin() -> Self {
        let mut lib = Self::new();
        lib.register("average", average);
        lib.register("sum", sum);
        lib.register("count", count);
        lib.register("min", min_value);
        lib.register("max", max_value);
        lib.register("median", median);
        lib.register("mode", mode);
        lib.register("alias", alias);
        lib.register("flat_fuse", flat_fuse);
        lib.register("magnitude", magnitude);
        lib.register("fill_missing", fill_missing);
        lib
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(i64, i64, &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
    }

    pub fn get(&self, name: &str) -> Option<&FeatureFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

// --- Built-in functions ---

fn numbers(points: &[DataPoint]) -> Result<Vec<f64>, FunctionError> {
    points
        .iter()
        .map(|p| {
            p.value
                .as_f64()
                .ok_or_else(|| FunctionError::new(format!("non-numeric value {} at {}", p.value, p.timestamp)))
        })
        .collect()
}

fn single_point(time: i64, window: i64, value: impl Into<Value>) -> Vec<DataPoint> {
    vec![DataPoint::new(time as f64, window as f64, value)]
}

/// Mean of the first input. An empty window averages to 0.
pub fn average(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let vals = numbers(inputs.single()?)?;
    let mean = if vals.is_empty() { 0.0 } else { vals.iter().sum::<f64>() / vals.len() as f64 };
    Ok(single_point(time, window, mean))
}

pub fn sum(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let vals = numbers(inputs.single()?)?;
    Ok(single_point(time, window, vals.iter().sum::<f64>()))
}

/// Number of points across all inputs.
pub fn count(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    Ok(single_point(time, window, inputs.point_count() as u64))
}

pub fn min_value(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let vals = numbers(inputs.single()?)?;
    let min = vals.into_iter().reduce(f64::min).ok_or_else(|| FunctionError::new("min of empty input"))?;
    Ok(single_point(time, window, min))
}

pub fn max_value(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let vals = numbers(inputs.single()?)?;
    let max = vals.into_iter().reduce(f64::max).ok_or_else(|| FunctionError::new("max of empty input"))?;
    Ok(single_point(time, window, max))
}

pub fn median(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let mut vals = numbers(inputs.single()?)?;
    if vals.is_empty() {
        return Err(FunctionError::new("median of empty input"));
    }
    vals.sort_by(f64::total_cmp);
    let mid = vals.len() / 2;
    let median = if vals.len() % 2 == 0 { (vals[mid - 1] + vals[mid]) / 2.0 } else { vals[mid] };
    Ok(single_point(time, window, median))
}

/// Most frequent value of the first input; ties go to the value seen first.
pub fn mode(time: i64, window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let points = inputs.single()?;
    let mut tally: Vec<(&Value, usize)> = Vec::new();
    for p in points {
        match tally.iter_mut().find(|(v, _)| *v == &p.value) {
            Some((_, n)) => *n += 1,
            None => tally.push((&p.value, 1)),
        }
    }
    let mut best: Option<(&Value, usize)> = None;
    for (value, n) in tally {
        if best.map_or(true, |(_, m)| n > m) {
            best = Some((value, n));
        }
    }
    let (value, _) = best.ok_or_else(|| FunctionError::new("mode of empty input"))?;
    Ok(single_point(time, window, value.clone()))
}

/// Passes the first input through unchanged.
pub fn alias(_time: i64, _window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    Ok(inputs.single()?.to_vec())
}

/// Concatenates all inputs, sorted by timestamp.
pub fn flat_fuse(_time: i64, _window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let mut out: Vec<DataPoint> = inputs.iter().flat_map(|(_, points)| points.iter().cloned()).collect();
    out.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(out)
}

/// Euclidean norm of `{x, y, z}` vectors, point by point. Empty objects are skipped.
pub fn magnitude(_time: i64, _window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let mut out = Vec::new();
    for p in inputs.single()? {
        let Some(obj) = p.value.as_object() else {
            return Err(FunctionError::new(format!("expected a vector at {}", p.timestamp)));
        };
        if obj.is_empty() {
            continue;
        }
        let mut sq = 0.0;
        for axis in ["x", "y", "z"] {
            let c = obj
                .get(axis)
                .and_then(Value::as_f64)
                .ok_or_else(|| FunctionError::new(format!("missing component '{}' at {}", axis, p.timestamp)))?;
            sq += c * c;
        }
        out.push(DataPoint::new(p.timestamp, p.timestep, sq.sqrt()));
    }
    Ok(out)
}

/// Replaces empty-object values by the closest earlier value; leading gaps take the first value.
pub fn fill_missing(_time: i64, _window: i64, inputs: &FeatureInputs) -> Result<Vec<DataPoint>, FunctionError> {
    let points = inputs.single()?;
    let is_gap = |v: &Value| v.as_object().map_or(false, |o| o.is_empty());

    let Some(mut fill) = points.iter().find(|p| !is_gap(&p.value)).map(|p| p.value.clone()) else {
        return Ok(Vec::new());
    };

    let mut out = Vec::with_capacity(points.len());
    for p in points {
        if is_gap(&p.value) {
            out.push(DataPoint::new(p.timestamp, p.timestep, fill.clone()));
        } else {
            fill = p.value.clone();
            out.push(p.clone());
        }
    }
    Ok(out)
}
