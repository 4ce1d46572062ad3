//! storage.rs
//! Columnar arena of time-sliced dependency nodes.
//!
//! Edges in both directions are singly linked lists threaded through flat vectors,
//! so appending an edge never moves existing ones and nodes never own each other.

use crate::types::Interval;
use std::collections::HashMap;
use std::sync::Arc;

const NIL: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(&self) -> usize { self.0 as usize }
    pub fn new(idx: usize) -> Self { Self(idx as u32) }
}

/// Head-insert linked list of edges.
#[derive(Debug, Clone, Default)]
struct EdgeList {
    first: Vec<u32>,
    targets: Vec<NodeId>,
    next: Vec<u32>,
}

impl EdgeList {
    fn push_node(&mut self) {
        self.first.push(NIL);
    }

    fn link(&mut self, from: NodeId, to: NodeId) {
        let head = self.first[from.index()];
        let edge = self.targets.len() as u32;
        self.targets.push(to);
        self.next.push(head);
        self.first[from.index()] = edge;
    }

    fn iter(&self, from: NodeId) -> Links<'_> {
        Links { targets: &self.targets, next: &self.next, cursor: self.first[from.index()] }
    }

    fn clear(&mut self) {
        self.first.clear();
        self.targets.clear();
        self.next.clear();
    }
}

/// Iterator over one node's adjacency list.
pub struct Links<'a> {
    targets: &'a [NodeId],
    next: &'a [u32],
    cursor: u32,
}

impl Iterator for Links<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        if self.cursor == NIL {
            return None;
        }
        let edge = self.cursor as usize;
        self.cursor = self.next[edge];
        Some(self.targets[edge])
    }
}

/// Per-source index: creation order plus interval lookup.
#[derive(Debug, Clone, Default)]
struct SourceSlot {
    nodes: Vec<NodeId>,
    by_interval: HashMap<Interval, NodeId>,
}

/// Interned `(source, interval)` nodes with dependency and dependee edges.
///
/// Node identity is the `(source, interval)` key: interning the same key twice
/// yields the same `NodeId` until the arena is cleared.
#[derive(Debug, Clone, Default)]
pub struct DependencyArena {
    sources: Vec<Arc<str>>,
    intervals: Vec<Interval>,
    met: Vec<bool>,
    expanded: Vec<bool>,

    dependencies: EdgeList,
    dependees: EdgeList,

    slots: HashMap<Arc<str>, SourceSlot>,
}

impl DependencyArena {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.sources.len() }

    pub fn is_empty(&self) -> bool { self.sources.is_empty() }

    /// Returns the node for `(source, interval)`, creating it if needed.
    /// The flag is `true` when the node was created by this call.
    pub fn intern(&mut self, source: &str, interval: Interval) -> (NodeId, bool) {
        if let Some(id) = self.get(source, interval) {
            return (id, false);
        }

        let id = NodeId::new(self.sources.len());
        let key: Arc<str> = match self.slots.get_key_value(source) {
            Some((key, _)) => Arc::clone(key),
            None => Arc::from(source),
        };

        self.sources.push(Arc::clone(&key));
        self.intervals.push(interval);
        self.met.push(false);
        self.expanded.push(false);
        self.dependencies.push_node();
        self.dependees.push_node();

        let slot = self.slots.entry(key).or_default();
        slot.nodes.push(id);
        slot.by_interval.insert(interval, id);

        (id, true)
    }

    pub fn get(&self, source: &str, interval: Interval) -> Option<NodeId> {
        self.slots.get(source).and_then(|slot| slot.by_interval.get(&interval).copied())
    }

    /// Records that `node` needs `dependency`. Repeated edges are ignored.
    pub fn add_dependency(&mut self, node: NodeId, dependency: NodeId) {
        if self.dependencies(node).any(|d| d == dependency) {
            return;
        }
        self.dependencies.link(node, dependency);
        self.dependees.link(dependency, node);
    }

    /// Nodes `id` depends on, most recently linked first.
    pub fn dependencies(&self, id: NodeId) -> Links<'_> {
        self.dependencies.iter(id)
    }

    /// Nodes that depend on `id`, most recently linked first.
    pub fn dependees(&self, id: NodeId) -> Links<'_> {
        self.dependees.iter(id)
    }

    /// All nodes of `source` in creation order.
    pub fn nodes_for(&self, source: &str) -> &[NodeId] {
        self.slots.get(source).map(|slot| slot.nodes.as_slice()).unwrap_or_default()
    }

    #[inline(always)]
    pub fn source(&self, id: NodeId) -> &str { &self.sources[id.index()] }

    #[inline(always)]
    pub fn interval(&self, id: NodeId) -> Interval { self.intervals[id.index()] }

    pub fn is_met(&self, id: NodeId) -> bool { self.met[id.index()] }

    /// Marks `id` as satisfied. A met node is never demoted.
    pub fn set_met(&mut self, id: NodeId) {
        self.met[id.index()] = true;
    }

    pub(crate) fn is_expanded(&self, id: NodeId) -> bool { self.expanded[id.index()] }

    pub(crate) fn set_expanded(&mut self, id: NodeId) {
        self.expanded[id.index()] = true;
    }

    pub fn clear(&mut self) {
        self.sources.clear();
        self.intervals.clear();
        self.met.clear();
        self.expanded.clear();
        self.dependencies.clear();
        self.dependees.clear();
        self.slots.clear();
    }
}
