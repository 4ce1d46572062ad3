//! External collaborators of a run: the input cache, file readers and output writers.
pub mod cache;
pub mod readers;
pub mod writers;

pub use cache::{InputCache, MemoryCache, OnlineCache, SnapshotBackend, SourceBackend};
pub use readers::{CsvTableReader, JsonPacketReader, Packet};
pub use writers::{CsvWriter, JsonWriter, MemoryWriter, OutputWriter};
