//! writers.rs
//! Durable outputs of a run. Entries are staged and persisted on `close`.

use crate::error::StoreError;
use crate::types::{DataPoint, Series};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

pub trait OutputWriter {
    /// Names the current output batch. File writers derive file names from it.
    fn set_descriptor(&mut self, descriptor: &str);

    /// Stages `entries` for persistence. The last entry per timestamp wins.
    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) -> Result<(), StoreError>;

    /// Flushes staged entries. Closing twice is a no-op.
    fn close(&mut self) -> Result<(), StoreError>;
}

/// Entries staged per source, ordered by source id then timestamp.
#[derive(Debug, Clone, Default)]
struct Staging {
    descriptor: String,
    data: BTreeMap<String, Series>,
    closed: bool,
}

impl Staging {
    fn add(&mut self, source_id: &str, entries: &[DataPoint]) -> Result<(), StoreError> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        let series = self.data.entry(source_id.to_string()).or_default();
        for point in entries {
            series.upsert(point.clone());
        }
        Ok(())
    }

    fn points(&self) -> impl Iterator<Item = (&str, &DataPoint)> {
        self.data.iter().flat_map(|(id, s)| s.points().iter().map(move |p| (id.as_str(), p)))
    }
}

/// Keeps staged entries in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    staging: Staging,
}

impl MemoryWriter {
    pub fn new() -> Self { Self::default() }

    pub fn descriptor(&self) -> &str { &self.staging.descriptor }

    pub fn is_closed(&self) -> bool { self.staging.closed }

    pub fn entries(&self, source_id: &str) -> &[DataPoint] {
        self.staging.data.get(source_id).map(Series::points).unwrap_or_default()
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.staging.data.keys().map(String::as_str)
    }
}

impl OutputWriter for MemoryWriter {
    fn set_descriptor(&mut self, descriptor: &str) {
        self.staging.descriptor = descriptor.to_string();
    }

    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) -> Result<(), StoreError> {
        self.staging.add(source_id, entries)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.staging.closed = true;
        Ok(())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonRecord<'a> {
    source_id: &'a str,
    location_id: &'a str,
    timestamp: f64,
    timestep: f64,
    values: [&'a Value; 1],
}

/// Writes `<target>/<descriptor>.json`, an array of one record per point.
#[derive(Debug, Clone)]
pub struct JsonWriter {
    location_id: String,
    target: PathBuf,
    staging: Staging,
}

impl JsonWriter {
    pub fn new(location_id: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self { location_id: location_id.into(), target: target.into(), staging: Staging::default() }
    }

    pub fn path(&self) -> PathBuf {
        self.target.join(format!("{}.json", self.staging.descriptor).replace(':', "_"))
    }
}

impl OutputWriter for JsonWriter {
    fn set_descriptor(&mut self, descriptor: &str) {
        self.staging.descriptor = descriptor.to_string();
    }

    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) -> Result<(), StoreError> {
        self.staging.add(source_id, entries)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.staging.closed {
            return Ok(());
        }
        self.staging.closed = true;

        let records: Vec<JsonRecord> = self
            .staging
            .points()
            .map(|(source_id, p)| JsonRecord {
                source_id,
                location_id: &self.location_id,
                timestamp: p.timestamp,
                timestep: p.timestep,
                values: [&p.value],
            })
            .collect();

        let path = self.path();
        fs::create_dir_all(&self.target)?;
        fs::write(&path, serde_json::to_vec(&records)?)?;
        log::info!("Wrote {} records to {:?}", records.len(), path);
        Ok(())
    }
}

/// Writes one `<target>/<descriptor>_<timestep>s.csv` table per distinct timestep.
#[derive(Debug, Clone)]
pub struct CsvWriter {
    target: PathBuf,
    staging: Staging,
}

impl CsvWriter {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self { target: target.into(), staging: Staging::default() }
    }

    fn tables(&self) -> BTreeMap<String, Table<'_>> {
        let mut tables: BTreeMap<String, Table> = BTreeMap::new();
        for (source_id, point) in self.staging.points() {
            let table = tables.entry(format_number(point.timestep)).or_default();
            if !table.columns.contains(&source_id) {
                table.columns.push(source_id);
            }
            table
                .rows
                .entry(TimeKey(point.timestamp))
                .or_default()
                .insert(source_id, &point.value);
        }
        tables
    }
}

#[derive(Default)]
struct Table<'a> {
    columns: Vec<&'a str>,
    rows: BTreeMap<TimeKey, BTreeMap<&'a str, &'a Value>>,
}

#[derive(Clone, Copy, PartialEq)]
struct TimeKey(f64);

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl OutputWriter for CsvWriter {
    fn set_descriptor(&mut self, descriptor: &str) {
        self.staging.descriptor = descriptor.to_string();
    }

    fn add_entries(&mut self, source_id: &str, entries: &[DataPoint]) -> Result<(), StoreError> {
        self.staging.add(source_id, entries)
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if self.staging.closed {
            return Ok(());
        }
        self.staging.closed = true;
        fs::create_dir_all(&self.target)?;

        for (timestep, table) in self.tables() {
            let mut out = String::from("timestamp");
            for column in &table.columns {
                out.push(',');
                out.push_str(&quote(column));
            }
            out.push('\n');

            for (time, row) in &table.rows {
                out.push_str(&format_number(time.0));
                for column in &table.columns {
                    out.push(',');
                    if let Some(value) = row.get(column) {
                        out.push_str(&quote(&cell(value)));
                    }
                }
                out.push('\n');
            }

            let name = format!("{}_{}s.csv", self.staging.descriptor, timestep).replace(':', "_");
            let path = self.target.join(name);
            fs::write(&path, out)?;
            log::info!("Wrote {} rows to {:?}", table.rows.len(), path);
        }
        Ok(())
    }
}

fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
