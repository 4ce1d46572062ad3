//! types.rs
//! Core value types shared by the graph, the engine and the IO layer.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use serde_json::Value;

/// Source id of the synthetic node that stands for the whole pipeline output.
pub const ROOT_SOURCE: &str = "@";

/// Half-open `(start, end]` span in epoch seconds.
///
/// Ordering is lexicographic on `(start, end)`, which is what interval merging sorts by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: i64,
}

impl Interval {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    #[inline(always)]
    pub fn len(&self) -> i64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}

impl From<(i64, i64)> for Interval {
    fn from((start, end): (i64, i64)) -> Self {
        Self { start, end }
    }
}

/// One `(timestamp, timestep, value)` sample of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: f64,
    pub timestep: f64,
    pub value: Value,
}

impl DataPoint {
    pub fn new(timestamp: impl Into<f64>, timestep: impl Into<f64>, value: impl Into<Value>) -> Self {
        Self { timestamp: timestamp.into(), timestep: timestep.into(), value: value.into() }
    }
}

/// Whether a source is ingested as-is or derived by a feature definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Raw,
    Calculated,
}

/// Points of one source, kept sorted by timestamp with at most one point per timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    points: Vec<DataPoint>,
}

impl Series {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.points.len() }

    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    pub fn points(&self) -> &[DataPoint] { &self.points }

    /// Inserts `point`, replacing any point recorded at the same timestamp.
    pub fn upsert(&mut self, point: DataPoint) {
        match self.points.binary_search_by(|p| p.timestamp.total_cmp(&point.timestamp)) {
            Ok(i) => self.points[i] = point,
            Err(i) => self.points.insert(i, point),
        }
    }

    /// Points with `start < timestamp <= end`.
    pub fn range(&self, interval: Interval) -> &[DataPoint] {
        let lo = self.points.partition_point(|p| p.timestamp <= interval.start as f64);
        let hi = self.points.partition_point(|p| p.timestamp <= interval.end as f64);
        if lo >= hi {
            return &[];
        }
        &self.points[lo..hi]
    }

    pub fn at(&self, timestamp: f64) -> Option<&DataPoint> {
        self.points
            .binary_search_by(|p| p.timestamp.total_cmp(&timestamp))
            .ok()
            .map(|i| &self.points[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_series_upsert_is_idempotent_per_timestamp() {
        let mut series = Series::new();
        series.upsert(DataPoint::new(20.0, 10.0, json!(2)));
        series.upsert(DataPoint::new(10.0, 10.0, json!(1)));
        series.upsert(DataPoint::new(20.0, 10.0, json!(3)));

        let values: Vec<_> = series.points().iter().map(|p| p.value.clone()).collect();
        assert_eq!(values, vec![json!(1), json!(3)]);
    }

    #[test]
    fn test_series_range_is_left_open() {
        let mut series = Series::new();
        for t in [0, 100, 200, 300] {
            series.upsert(DataPoint::new(t as f64, 100.0, json!(t)));
        }
        let picked: Vec<f64> = series.range(Interval::new(0, 200)).iter().map(|p| p.timestamp).collect();
        assert_eq!(picked, vec![100.0, 200.0]);
        assert!(series.range(Interval::new(300, 400)).is_empty());
        assert_eq!(series.at(300.0).map(|p| p.value.clone()), Some(json!(300)));
    }

    #[test]
    fn test_interval_overlap() {
        let a = Interval::new(0, 300);
        assert!(a.overlaps(&Interval::new(299, 600)));
        assert!(!a.overlaps(&Interval::new(300, 600)));
    }
}
