//! context.rs
//! Run-scoped owner of both interned graphs and the routines that expand them.

use super::storage::{DependencyArena, NodeId};
use super::topology::{DepthEntry, FeatureTopology};
use crate::error::PipelineError;
use crate::features::FeatureRegistry;
use crate::types::{Interval, ROOT_SOURCE};
use petgraph::graph::NodeIndex;

/// Graph state of a single run. Call [`RunContext::reset`] before reusing it for another run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub(crate) topology: FeatureTopology,
    pub(crate) arena: DependencyArena,
    root: Option<NodeId>,
}

impl RunContext {
    pub fn new() -> Self { Self::default() }

    /// Drops every node of both graphs.
    pub fn reset(&mut self) {
        self.topology.clear();
        self.arena.clear();
        self.root = None;
    }

    pub fn topology(&self) -> &FeatureTopology { &self.topology }

    pub fn arena(&self) -> &DependencyArena { &self.arena }

    /// The `@` node of the last time graph built, if any.
    pub fn root(&self) -> Option<NodeId> { self.root }

    /// Interns the feature graph reachable from `sources` and returns it in depth order.
    pub fn build_feature_topology(
        &mut self,
        registry: &FeatureRegistry,
        sources: &[String],
    ) -> Result<Vec<DepthEntry>, PipelineError> {
        self.topology.clear();
        let (root, _) = self.topology.intern(ROOT_SOURCE);

        for source in sources {
            let node = self.visit_feature(registry, source);
            self.topology.add_dependency(root, node);
        }

        let order = self.topology.depths()?;
        log::debug!("Feature topology: {} sources", order.len());
        Ok(order)
    }

    fn visit_feature(&mut self, registry: &FeatureRegistry, source_id: &str) -> NodeIndex {
        let (node, created) = self.topology.intern(source_id);
        if !created {
            return node;
        }
        if let Some(def) = registry.definition(source_id) {
            for input in &def.inputs {
                let input_node = self.visit_feature(registry, input.source_id());
                self.topology.add_dependency(node, input_node);
            }
        }
        node
    }

    /// Expands `sources` over `span` into interned `(source, interval)` nodes under a fresh root.
    ///
    /// Raw sources become one node for the whole requested interval. Calculated
    /// features are split into steps of their window, and each step requests every
    /// input over the window that ends where the step ends.
    pub fn build_time_graph(
        &mut self,
        registry: &FeatureRegistry,
        sources: &[String],
        span: Interval,
    ) -> Result<NodeId, PipelineError> {
        let requests: Vec<(&str, Interval)> = sources.iter().map(|s| (s.as_str(), span)).collect();
        self.build_time_graph_for(registry, &requests, span)
    }

    /// Like [`RunContext::build_time_graph`], with an interval per requested source.
    pub fn build_time_graph_for(
        &mut self,
        registry: &FeatureRegistry,
        requests: &[(&str, Interval)],
        span: Interval,
    ) -> Result<NodeId, PipelineError> {
        self.arena.clear();
        let (root, _) = self.arena.intern(ROOT_SOURCE, span);
        self.root = Some(root);

        let mut path: Vec<String> = Vec::new();
        for &(source, interval) in requests {
            self.expand(registry, source, interval, root, &mut path)?;
        }

        log::debug!("Time graph: {} nodes over {}", self.arena.len(), span);
        Ok(root)
    }

    fn expand(
        &mut self,
        registry: &FeatureRegistry,
        source_id: &str,
        interval: Interval,
        dependee: NodeId,
        path: &mut Vec<String>,
    ) -> Result<(), PipelineError> {
        let Some(def) = registry.definition(source_id) else {
            let (node, _) = self.arena.intern(source_id, interval);
            self.arena.add_dependency(dependee, node);
            return Ok(());
        };

        if path.iter().any(|p| p == source_id) {
            return Err(PipelineError::CyclicDefinition { source_id: source_id.to_string() });
        }

        let window = def.effective_window(interval.len());
        check_divisible(source_id, interval, window)?;

        path.push(source_id.to_string());
        let mut t = interval.start;
        while t + window <= interval.end {
            let step_end = t + window;
            let (node, _) = self.arena.intern(source_id, Interval::new(t, step_end));
            self.arena.add_dependency(dependee, node);

            if !self.arena.is_expanded(node) {
                self.arena.set_expanded(node);
                for input in &def.inputs {
                    let (input_id, input_window) = input.resolve(window);
                    let anchored = Interval::new(step_end - input_window, step_end);
                    self.expand(registry, input_id, anchored, node, path)?;
                }
            }
            t = step_end;
        }
        path.pop();
        Ok(())
    }
}

/// Fails unless `interval` splits into whole, non-empty windows.
pub(crate) fn check_divisible(source_id: &str, interval: Interval, window: i64) -> Result<(), PipelineError> {
    if window <= 0 || interval.len() < 0 || interval.len() % window != 0 {
        return Err(PipelineError::WindowNotDivisible {
            source_id: source_id.to_string(),
            interval,
            window,
        });
    }
    Ok(())
}
