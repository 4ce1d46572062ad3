//! cache.rs
//! The input cache the engine reads from, optionally backed by a queryable store.

use crate::error::StoreError;
use crate::types::{DataPoint, Interval, Series};
use std::collections::HashMap;

/// Read/write access to the data available to a run.
///
/// `query` pulls a span from the backing store into the cache; all other
/// operations only touch what is already cached.
pub trait InputCache {
    /// Whether a live backing store exists. Offline caches hold everything up front.
    fn is_online(&self) -> bool;

    /// Fetches `(interval.start, interval.end]` of `source_id` into the cache.
    fn query(&mut self, source_id: &str, interval: Interval) -> Result<(), StoreError>;

    fn contains(&self, source_id: &str, timestamp: f64) -> bool;

    /// Cached points of `source_id` inside `interval`, sorted by timestamp.
    fn get(&self, source_id: &str, interval: Interval) -> Vec<DataPoint>;

    fn get_at(&self, source_id: &str, timestamp: f64) -> Option<DataPoint>;

    /// Records computed points. Writing the same timestamp twice keeps the last point.
    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]);

    fn has_data(&self, source_id: &str, interval: Interval) -> bool {
        !self.get(source_id, interval).is_empty()
    }
}

/// In-memory cache with no backing store.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    series: HashMap<String, Series>,
}

impl MemoryCache {
    pub fn new() -> Self { Self::default() }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    pub fn point_count(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    pub fn insert(&mut self, source_id: &str, point: DataPoint) {
        self.series.entry(source_id.to_string()).or_default().upsert(point);
    }
}

impl InputCache for MemoryCache {
    fn is_online(&self) -> bool {
        false
    }

    fn query(&mut self, _source_id: &str, _interval: Interval) -> Result<(), StoreError> {
        Ok(())
    }

    fn contains(&self, source_id: &str, timestamp: f64) -> bool {
        self.series.get(source_id).map_or(false, |s| s.at(timestamp).is_some())
    }

    fn get(&self, source_id: &str, interval: Interval) -> Vec<DataPoint> {
        self.series.get(source_id).map_or_else(Vec::new, |s| s.range(interval).to_vec())
    }

    fn get_at(&self, source_id: &str, timestamp: f64) -> Option<DataPoint> {
        self.series.get(source_id)?.at(timestamp).cloned()
    }

    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) {
        let series = self.series.entry(source_id.to_string()).or_default();
        for point in entries {
            series.upsert(point.clone());
        }
    }

    fn has_data(&self, source_id: &str, interval: Interval) -> bool {
        self.series.get(source_id).map_or(false, |s| !s.range(interval).is_empty())
    }
}

/// A store that can be asked for the points of one source over one interval.
pub trait SourceBackend {
    fn fetch(&mut self, source_id: &str, interval: Interval) -> Result<Vec<DataPoint>, StoreError>;
}

/// Memory cache that pulls from a [`SourceBackend`] on `query`.
#[derive(Debug, Clone, Default)]
pub struct OnlineCache<B> {
    local: MemoryCache,
    backend: B,
}

impl<B: SourceBackend> OnlineCache<B> {
    pub fn new(backend: B) -> Self {
        Self { local: MemoryCache::new(), backend }
    }

    pub fn backend(&self) -> &B { &self.backend }
}

impl<B: SourceBackend> InputCache for OnlineCache<B> {
    fn is_online(&self) -> bool {
        true
    }

    fn query(&mut self, source_id: &str, interval: Interval) -> Result<(), StoreError> {
        let points = self.backend.fetch(source_id, interval)?;
        log::debug!("Fetched {} points of {} over {}", points.len(), source_id, interval);
        self.local.add_entries(source_id, &points);
        Ok(())
    }

    fn contains(&self, source_id: &str, timestamp: f64) -> bool {
        self.local.contains(source_id, timestamp)
    }

    fn get(&self, source_id: &str, interval: Interval) -> Vec<DataPoint> {
        self.local.get(source_id, interval)
    }

    fn get_at(&self, source_id: &str, timestamp: f64) -> Option<DataPoint> {
        self.local.get_at(source_id, timestamp)
    }

    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) {
        self.local.add_entries(source_id, entries);
    }

    fn has_data(&self, source_id: &str, interval: Interval) -> bool {
        self.local.has_data(source_id, interval)
    }
}

/// Backend serving a snapshot loaded up front, e.g. from exported files.
/// Every fetch is recorded.
#[derive(Debug, Clone, Default)]
pub struct SnapshotBackend {
    data: MemoryCache,
    pub fetches: Vec<(String, Interval)>,
}

impl SnapshotBackend {
    pub fn new(data: MemoryCache) -> Self {
        Self { data, fetches: Vec::new() }
    }

    pub fn fetches_for(&self, source_id: &str) -> Vec<Interval> {
        self.fetches.iter().filter(|(s, _)| s == source_id).map(|(_, i)| *i).collect()
    }
}

impl SourceBackend for SnapshotBackend {
    fn fetch(&mut self, source_id: &str, interval: Interval) -> Result<Vec<DataPoint>, StoreError> {
        self.fetches.push((source_id.to_string(), interval));
        Ok(self.data.get(source_id, interval))
    }
}
