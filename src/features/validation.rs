//! Static checks over a set of feature definitions, run before any calculation.

use super::definition::InputSpec;
use super::registry::FeatureRegistry;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;
use std::fmt;

/// The category of a validation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorType {
    /// The definition names a function the library does not provide.
    UnknownFunction,
    /// The feature window is negative, or an input window override is not positive.
    InvalidWindow,
    /// The feature depends on itself, directly or through other features.
    Cycle,
}

/// One problem found in a feature definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub source_id: String,
    pub error_type: ValidationErrorType,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source_id, self.message)
    }
}

/// Lints every definition of `registry`, collecting all errors instead of stopping at the first.
pub fn validate(registry: &FeatureRegistry) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    for (id, def) in registry.definitions() {
        if !registry.library().contains(&def.function) {
            errors.push(ValidationError {
                source_id: id.to_string(),
                error_type: ValidationErrorType::UnknownFunction,
                message: format!("unknown function '{}'", def.function),
            });
        }
        if def.window < 0 {
            errors.push(ValidationError {
                source_id: id.to_string(),
                error_type: ValidationErrorType::InvalidWindow,
                message: format!("negative window {}", def.window),
            });
        }
        for input in &def.inputs {
            if let InputSpec::Windowed(input_id, window) = input {
                if *window <= 0 {
                    errors.push(ValidationError {
                        source_id: id.to_string(),
                        error_type: ValidationErrorType::InvalidWindow,
                        message: format!("input '{}' has non-positive window {}", input_id, window),
                    });
                }
            }
        }
    }

    errors.extend(find_cycles(registry));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn find_cycles(registry: &FeatureRegistry) -> Vec<ValidationError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index: HashMap<&str, NodeIndex> = HashMap::new();

    for (id, def) in registry.definitions() {
        let consumer = intern(&mut graph, &mut index, id);
        for input in &def.inputs {
            let dependency = intern(&mut graph, &mut index, input.source_id());
            graph.update_edge(consumer, dependency, ());
        }
    }

    let mut errors = Vec::new();
    for component in tarjan_scc(&graph) {
        let is_cycle = component.len() > 1
            || component.first().map_or(false, |&n| graph.contains_edge(n, n));
        if !is_cycle {
            continue;
        }
        let mut members: Vec<&str> = component.iter().map(|&n| graph[n]).collect();
        members.sort_unstable();
        for member in &members {
            errors.push(ValidationError {
                source_id: member.to_string(),
                error_type: ValidationErrorType::Cycle,
                message: format!("cyclic dependency among [{}]", members.join(", ")),
            });
        }
    }
    errors
}

fn intern<'a>(
    graph: &mut DiGraph<&'a str, ()>,
    index: &mut HashMap<&'a str, NodeIndex>,
    id: &'a str,
) -> NodeIndex {
    *index.entry(id).or_insert_with(|| graph.add_node(id))
}
