//! topology.rs
//! Time-agnostic feature graph: one node per source, edges from consumer to input.

use crate::error::PipelineError;
use crate::types::ROOT_SOURCE;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;

/// A source together with its distance from the pipeline root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthEntry {
    pub source_id: Arc<str>,
    pub depth: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FeatureTopology {
    graph: DiGraph<Arc<str>, ()>,
    index: HashMap<Arc<str>, NodeIndex>,
}

impl FeatureTopology {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.graph.node_count() }

    pub fn is_empty(&self) -> bool { self.graph.node_count() == 0 }

    /// Returns the node of `source_id`, creating it on first use.
    /// The flag is `true` when the node was created by this call.
    pub fn intern(&mut self, source_id: &str) -> (NodeIndex, bool) {
        if let Some(&idx) = self.index.get(source_id) {
            return (idx, false);
        }
        let key: Arc<str> = Arc::from(source_id);
        let idx = self.graph.add_node(Arc::clone(&key));
        self.index.insert(key, idx);
        (idx, true)
    }

    pub fn add_dependency(&mut self, consumer: NodeIndex, input: NodeIndex) {
        self.graph.update_edge(consumer, input, ());
    }

    /// Direct inputs of `source_id`.
    pub fn dependencies(&self, source_id: &str) -> Vec<&str> {
        self.neighbors(source_id, Direction::Outgoing)
    }

    /// Direct consumers of `source_id`.
    pub fn dependees(&self, source_id: &str) -> Vec<&str> {
        self.neighbors(source_id, Direction::Incoming)
    }

    fn neighbors(&self, source_id: &str, dir: Direction) -> Vec<&str> {
        let Some(&idx) = self.index.get(source_id) else {
            return Vec::new();
        };
        let mut out: Vec<&str> = self
            .graph
            .neighbors_directed(idx, dir)
            .map(|n| self.graph[n].as_ref())
            .collect();
        out.sort_unstable();
        out
    }

    /// Sources ordered by depth, the root excluded.
    ///
    /// The root has depth 0 and every other node sits one below its deepest
    /// consumer, so a source is always listed after everything that reads it.
    pub fn depths(&self) -> Result<Vec<DepthEntry>, PipelineError> {
        let order = toposort(&self.graph, None).map_err(|cycle| PipelineError::CyclicDefinition {
            source_id: self.graph[cycle.node_id()].to_string(),
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        for &node in &order {
            let d = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|consumer| depth.get(&consumer))
                .max()
                .map_or(0, |&d| d + 1);
            depth.insert(node, d);
        }

        let position: HashMap<NodeIndex, usize> = order.iter().enumerate().map(|(i, &n)| (n, i)).collect();
        let mut entries: Vec<(usize, usize, NodeIndex)> = order
            .iter()
            .filter(|&&n| self.graph[n].as_ref() != ROOT_SOURCE)
            .map(|&n| (depth[&n], position[&n], n))
            .collect();
        entries.sort_unstable();

        Ok(entries
            .into_iter()
            .map(|(d, _, n)| DepthEntry { source_id: Arc::clone(&self.graph[n]), depth: d })
            .collect())
    }

    pub fn clear(&mut self) {
        self.graph.clear();
        self.index.clear();
    }
}
