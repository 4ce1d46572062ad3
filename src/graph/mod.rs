//! The two interned graphs of a run: feature topology and time-sliced dependencies.
pub mod context;
pub mod storage;
pub mod topology;

pub use context::RunContext;
pub use storage::{DependencyArena, NodeId};
pub use topology::{DepthEntry, FeatureTopology};
