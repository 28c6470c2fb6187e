// SPDX-License-Identifier: MIT

//! Graph validation - cycle detection, reference checks and a
//! deterministic topological order
//!
//! Validation never fails: every problem is reported as a string code in
//! `ValidationResult::errors`.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use super::types::{CompositeGraphDefinition, CompositeNode, ValidationResult};
use crate::core::collaborators::RefResolver;

pub const GRAPH_CYCLE_DETECTED: &str = "graph_cycle_detected";

/// Options for `validate_composite_graph`
#[derive(Default, Clone, Copy)]
pub struct ValidateOptions<'a> {
    /// Reference checker; `None` skips reference checks entirely
    pub resolver: Option<&'a dyn RefResolver>,
}

impl<'a> ValidateOptions<'a> {
    pub fn with_resolver(resolver: &'a dyn RefResolver) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }
}

/// Validate a normalized graph
pub async fn validate_composite_graph(
    graph: &CompositeGraphDefinition,
    options: ValidateOptions<'_>,
) -> ValidationResult {
    let mut errors: Vec<String> = graph
        .duplicate_node_ids
        .iter()
        .map(|id| format!("duplicate_node_id:{}", id))
        .collect();

    let (order, dangling) = topological_order(graph);
    errors.extend(
        dangling
            .into_iter()
            .map(|(from, to)| format!("edge_node_not_found:{}->{}", from, to)),
    );
    if order.is_none() {
        errors.push(GRAPH_CYCLE_DETECTED.to_string());
    }

    if let Some(resolver) = options.resolver {
        for node in &graph.nodes {
            if let Some(error) = check_ref(resolver, node).await {
                errors.push(error);
            }
        }
    }

    if !errors.is_empty() {
        log::warn!(
            "Composite {} failed validation: {:?}",
            graph.composite_id,
            errors
        );
    }

    ValidationResult::from_parts(errors, order)
}

async fn check_ref(resolver: &dyn RefResolver, node: &CompositeNode) -> Option<String> {
    match resolver.resolve_ref(node).await {
        Ok(true) => None,
        Ok(false) => Some(format!(
            "node_ref_not_found:{}:{}",
            node.kind(),
            node.ref_id()
        )),
        Err(e) => {
            log::warn!(
                "Reference check failed for node {} ({}:{}): {}",
                node.id(),
                node.kind(),
                node.ref_id(),
                e
            );
            Some(format!(
                "node_ref_check_failed:{}:{}",
                node.kind(),
                node.ref_id()
            ))
        }
    }
}

/// Kahn's algorithm, always releasing the ready node with the lowest index
/// in the original node list.
///
/// Returns `None` for the order when a cycle remains, plus every edge whose
/// endpoints are not both known nodes (those edges are ignored).
fn topological_order(
    graph: &CompositeGraphDefinition,
) -> (Option<Vec<String>>, Vec<(String, String)>) {
    let index: HashMap<&str, usize> = graph
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); graph.nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; graph.nodes.len()];
    let mut dangling = Vec::new();

    for edge in &graph.edges {
        match (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
            (Some(&from), Some(&to)) => {
                adjacency[from].push(to);
                in_degree[to] += 1;
            }
            _ => dangling.push((edge.from.clone(), edge.to.clone())),
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, &deg)| deg == 0)
        .map(|(i, _)| Reverse(i))
        .collect();

    let mut order = Vec::with_capacity(graph.nodes.len());
    while let Some(Reverse(current)) = ready.pop() {
        order.push(graph.nodes[current].id().to_string());
        for &next in &adjacency[current] {
            in_degree[next] -= 1;
            if in_degree[next] == 0 {
                ready.push(Reverse(next));
            }
        }
    }

    if order.len() == graph.nodes.len() {
        (Some(order), dangling)
    } else {
        (None, dangling)
    }
}
