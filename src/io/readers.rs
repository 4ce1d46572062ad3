//! readers.rs
//! Loaders that fill a [`MemoryCache`] from exported files.

use super::cache::MemoryCache;
use crate::error::StoreError;
use crate::types::{DataPoint, Value};
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// One exported packet: `values` are spread evenly over `timestep` starting at `timestamp`.
#[derive(Debug, Clone, Deserialize)]
pub struct Packet {
    #[serde(alias = "sourceId")]
    pub source_id: String,
    #[serde(default, alias = "locationId")]
    pub location_id: String,
    pub timestamp: f64,
    pub timestep: f64,
    pub values: Vec<Value>,
}

impl Packet {
    /// Splits the packet into one point per measurement.
    pub fn points(&self) -> impl Iterator<Item = DataPoint> + '_ {
        let step = if self.values.is_empty() { 0.0 } else { self.timestep / self.values.len() as f64 };
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| DataPoint::new(self.timestamp + step * i as f64, step, v.clone()))
    }

    /// An empty packet location matches every location.
    pub fn belongs_to(&self, location_id: &str) -> bool {
        self.location_id.is_empty() || self.location_id == location_id
    }
}

/// Reads JSON arrays of [`Packet`]s for one location.
#[derive(Debug, Clone)]
pub struct JsonPacketReader {
    location_id: String,
}

impl JsonPacketReader {
    pub fn new(location_id: impl Into<String>) -> Self {
        Self { location_id: location_id.into() }
    }

    pub fn load_into(&self, path: &Path, cache: &mut MemoryCache) -> Result<usize, StoreError> {
        let raw = fs::read_to_string(path)?;
        // Exports occasionally carry stray DC3 control characters.
        let cleaned = raw.replace('\u{13}', "");
        let packets: Vec<Packet> = serde_json::from_str(&cleaned)?;

        let mut loaded = 0;
        for packet in packets.iter().filter(|p| p.belongs_to(&self.location_id)) {
            for point in packet.points() {
                cache.insert(&packet.source_id, point);
                loaded += 1;
            }
        }
        log::debug!("Loaded {} points from {:?}", loaded, path);
        Ok(loaded)
    }

    pub fn load<P: AsRef<Path>>(&self, paths: &[P]) -> Result<MemoryCache, StoreError> {
        let mut cache = MemoryCache::new();
        for path in paths {
            self.load_into(path.as_ref(), &mut cache)?;
        }
        Ok(cache)
    }
}

/// Reads CSV tables with a millisecond `timestamp` column followed by one column per source.
#[derive(Debug, Clone)]
pub struct CsvTableReader {
    timestep: f64,
}

impl CsvTableReader {
    pub fn new(timestep: f64) -> Self {
        Self { timestep }
    }

    pub fn load_into(&self, path: &Path, cache: &mut MemoryCache) -> Result<usize, StoreError> {
        let raw = fs::read_to_string(path)?;
        let mut lines = raw.lines().filter(|l| !l.trim().is_empty());
        let Some(header) = lines.next() else {
            return Ok(0);
        };
        let header = split_csv_line(header);

        let mut loaded = 0;
        for (row_no, line) in lines.enumerate() {
            let cells = split_csv_line(line);
            let Some(first) = cells.first() else { continue };
            let millis: f64 = first.trim().parse().map_err(|_| {
                StoreError::Backend(format!("{:?} row {}: bad timestamp '{}'", path, row_no + 2, first))
            })?;
            let timestamp = millis / 1000.0;

            for (source_id, cell) in header.iter().skip(1).zip(cells.iter().skip(1)) {
                if cell.is_empty() {
                    continue;
                }
                let value = serde_json::from_str(cell).unwrap_or_else(|_| Value::String(cell.clone()));
                cache.insert(source_id, DataPoint::new(timestamp, self.timestep, value));
                loaded += 1;
            }
        }
        log::debug!("Loaded {} points from {:?}", loaded, path);
        Ok(loaded)
    }
}

/// Splits one CSV record, honoring double-quoted fields with `""` escapes.
pub(crate) fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', _) => quoted = !quoted,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}
