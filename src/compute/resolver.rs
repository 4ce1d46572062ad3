//! resolver.rs
//! Decides which time-sliced nodes are already satisfied and which must be calculated.

use super::missing::MissingSet;
use crate::error::PipelineError;
use crate::features::FeatureRegistry;
use crate::graph::{DepthEntry, NodeId, RunContext};
use crate::io::InputCache;
use crate::time::merge_intervals;
use crate::types::SourceKind;
use std::collections::BTreeSet;

pub struct Resolver<'a> {
    registry: &'a FeatureRegistry,
    force_recompute: &'a BTreeSet<String>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a FeatureRegistry, force_recompute: &'a BTreeSet<String>) -> Self {
        Self { registry, force_recompute }
    }

    /// Walks `order` and returns the calculated intervals that still need computing.
    ///
    /// Sources are visited consumers first, so a node only counts as needed while
    /// some node reading it is itself unmet. Raw sources and stored features are
    /// fetched with one query per merged run of needed intervals.
    pub fn resolve(
        &self,
        ctx: &mut RunContext,
        order: &[DepthEntry],
        cache: &mut dyn InputCache,
    ) -> Result<MissingSet, PipelineError> {
        let mut missing = MissingSet::new();

        for entry in order {
            let source_id: &str = &entry.source_id;
            let forced = self.force_recompute.contains(source_id);

            let needed: Vec<NodeId> = ctx
                .arena
                .nodes_for(source_id)
                .iter()
                .copied()
                .filter(|&n| {
                    forced || (!ctx.arena.is_met(n) && ctx.arena.dependees(n).any(|d| !ctx.arena.is_met(d)))
                })
                .collect();
            if needed.is_empty() {
                continue;
            }

            let kind = self.registry.classify(source_id);
            let fetch = kind == SourceKind::Raw || self.registry.is_stored(source_id);
            if fetch && cache.is_online() {
                let merged = merge_intervals(needed.iter().map(|&n| ctx.arena.interval(n)));
                for interval in merged {
                    log::debug!("Querying {} over {}", source_id, interval);
                    cache.query(source_id, interval).map_err(|e| {
                        PipelineError::store(format!("querying {} over {}", source_id, interval), e)
                    })?;
                }
            }

            for node in needed {
                let interval = ctx.arena.interval(node);
                if !forced && cache.has_data(source_id, interval) {
                    ctx.arena.set_met(node);
                } else if kind == SourceKind::Calculated {
                    missing.insert(source_id, interval);
                } else {
                    log::debug!("No data for raw source {} over {}", source_id, interval);
                }
            }
        }

        log::debug!("Missing after resolution: {}", missing);
        Ok(missing)
    }
}
