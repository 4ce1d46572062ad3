//! missing.rs
//! Unmet `(source, interval)` pairs awaiting calculation.

use crate::types::Interval;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingSet {
    entries: BTreeMap<String, BTreeSet<Interval>>,
}

impl MissingSet {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, source_id: &str, interval: Interval) -> bool {
        self.entries.entry(source_id.to_string()).or_default().insert(interval)
    }

    /// Removes one interval, dropping the source once it has none left.
    pub fn remove(&mut self, source_id: &str, interval: Interval) -> bool {
        let Some(set) = self.entries.get_mut(source_id) else {
            return false;
        };
        let removed = set.remove(&interval);
        if set.is_empty() {
            self.entries.remove(source_id);
        }
        removed
    }

    pub fn contains(&self, source_id: &str, interval: Interval) -> bool {
        self.entries.get(source_id).map_or(false, |set| set.contains(&interval))
    }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Total number of missing intervals across all sources.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeSet::len).sum()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn intervals(&self, source_id: &str) -> impl Iterator<Item = Interval> + '_ {
        self.entries.get(source_id).into_iter().flat_map(|set| set.iter().copied())
    }

    /// Takes the first interval of the first source.
    pub fn pop(&mut self) -> Option<(String, Interval)> {
        let source_id = self.entries.keys().next()?.clone();
        let interval = self.entries.get_mut(&source_id)?.pop_first()?;
        if self.entries.get(&source_id).map_or(false, BTreeSet::is_empty) {
            self.entries.remove(&source_id);
        }
        Some((source_id, interval))
    }

    /// Removes and returns every interval of `source_id` that overlaps `window`.
    pub fn claim_overlapping(&mut self, source_id: &str, window: Interval) -> Vec<Interval> {
        let claimed: Vec<Interval> = self.intervals(source_id).filter(|i| i.overlaps(&window)).collect();
        for interval in &claimed {
            self.remove(source_id, *interval);
        }
        claimed
    }
}

impl fmt::Display for MissingSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (n, (source, set)) in self.entries.iter().enumerate() {
            if n > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: [", source)?;
            for (m, interval) in set.iter().enumerate() {
                if m > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", interval)?;
            }
            write!(f, "]")?;
        }
        write!(f, "}}")
    }
}
