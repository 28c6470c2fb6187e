// SPDX-License-Identifier: MIT

//! Graph normalization - converts persisted, loosely typed definitions to
//! the canonical `CompositeGraphDefinition`
//!
//! Normalization never fails. Entries that cannot be coerced are dropped so
//! that validation stays the single place deciding whether a graph is usable.

use serde_json::Value;
use std::collections::HashSet;

use super::types::{
    CombineMode, CompositeEdge, CompositeGraphDefinition, CompositeNode, CompositeRunRequest,
    OutputPolicy,
};

/// Normalize a raw JSON graph definition.
///
/// Recognized keys: `compositeId` (or `id`), `combineMode`, `outputPolicy`,
/// `nodes` (or `nodesJson`) and `edges` (or `edgesJson`).
pub fn normalize_composite_graph(raw: &Value) -> CompositeGraphDefinition {
    let composite_id = first_str(raw, &["compositeId", "composite_id", "id"])
        .unwrap_or_default()
        .to_string();
    let combine_mode = first_str(raw, &["combineMode", "combine_mode"]);
    let output_policy = first_str(raw, &["outputPolicy", "output_policy"]);
    let nodes = first_value(raw, &["nodes", "nodesJson", "nodes_json"]);
    let edges = first_value(raw, &["edges", "edgesJson", "edges_json"]);

    normalize_parts(composite_id, combine_mode, output_policy, nodes, edges)
}

impl CompositeRunRequest {
    /// Normalize the graph carried by this request
    pub fn graph(&self) -> CompositeGraphDefinition {
        normalize_parts(
            self.composite_id.clone(),
            self.combine_mode.as_deref(),
            self.output_policy.as_deref(),
            Some(&self.nodes_json),
            Some(&self.edges_json),
        )
    }
}

fn normalize_parts(
    composite_id: String,
    combine_mode: Option<&str>,
    output_policy: Option<&str>,
    nodes: Option<&Value>,
    edges: Option<&Value>,
) -> CompositeGraphDefinition {
    let combine_mode = combine_mode.map(CombineMode::parse).unwrap_or_default();

    let output_policy = match output_policy {
        None => OutputPolicy::default(),
        Some(raw) => OutputPolicy::parse(raw).unwrap_or_else(|| {
            log::warn!(
                "Composite {}: unknown output policy '{}', using first_non_neutral",
                composite_id,
                raw
            );
            OutputPolicy::default()
        }),
    };

    let mut seen = HashSet::new();
    let mut duplicate_node_ids = Vec::new();
    let mut canonical_nodes = Vec::new();
    for entry in as_entries(nodes) {
        let Some(node) = normalize_node(&entry) else {
            log::debug!("Composite {}: dropping malformed node {}", composite_id, entry);
            continue;
        };
        if seen.insert(node.id().to_string()) {
            canonical_nodes.push(node);
        } else {
            duplicate_node_ids.push(node.id().to_string());
        }
    }

    let canonical_edges = as_entries(edges)
        .iter()
        .filter_map(normalize_edge)
        .collect();

    CompositeGraphDefinition {
        composite_id,
        combine_mode,
        output_policy,
        nodes: canonical_nodes,
        edges: canonical_edges,
        duplicate_node_ids,
    }
}

/// Entries of a JSON array, or of a JSON-encoded array string
fn as_entries(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded) {
            Ok(Value::Array(items)) => items,
            _ => vec![],
        },
        _ => vec![],
    }
}

fn normalize_node(entry: &Value) -> Option<CompositeNode> {
    let id = non_empty(entry, &["id"])?;
    let ref_id = non_empty(entry, &["refId", "ref_id"])?;
    let kind = non_empty(entry, &["kind"])?.to_ascii_lowercase();

    match kind.as_str() {
        "local" => {
            let config = match entry.get("config") {
                Some(Value::Object(map)) => Value::Object(map.clone()),
                _ => Value::Object(Default::default()),
            };
            Some(CompositeNode::Local { id, ref_id, config })
        }
        "ai" => Some(CompositeNode::Ai { id, ref_id }),
        _ => None,
    }
}

fn normalize_edge(entry: &Value) -> Option<CompositeEdge> {
    let from = non_empty(entry, &["from"])?;
    let to = non_empty(entry, &["to"])?;
    let rule = entry.get("rule").filter(|r| !r.is_null()).cloned();
    Some(CompositeEdge { from, to, rule })
}

fn first_value<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| raw.get(*k).filter(|v| !v.is_null()))
}

fn first_str<'a>(raw: &'a Value, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| raw.get(*k).and_then(Value::as_str))
}

fn non_empty(entry: &Value, keys: &[&str]) -> Option<String> {
    let value = first_str(entry, keys)?.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_applied() {
        let graph = normalize_composite_graph(&json!({
            "compositeId": "c1",
            "nodes": [{"id": "a", "kind": "local", "refId": "local_1"}]
        }));

        assert_eq!(graph.composite_id, "c1");
        assert_eq!(graph.combine_mode, CombineMode::Pipeline);
        assert_eq!(graph.output_policy, OutputPolicy::FirstNonNeutral);
        assert_eq!(graph.nodes, vec![CompositeNode::local("a", "local_1")]);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_malformed_entries_dropped() {
        let graph = normalize_composite_graph(&json!({
            "nodes": [
                {"id": "a", "kind": "local", "refId": "l1"},
                {"id": "", "kind": "local", "refId": "l2"},
                {"id": "b", "kind": "remote", "refId": "l3"},
                {"id": "c", "kind": "AI"},
                "not-an-object",
                42,
                {"id": "d", "kind": " AI ", "ref_id": "prompt_1"}
            ],
            "edges": [
                {"from": "a", "to": "d", "rule": {"when": "up"}},
                {"from": "a"},
                {"from": 1, "to": "d"},
                null
            ]
        }));

        let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["a", "d"]);
        assert_eq!(graph.nodes[1], CompositeNode::ai("d", "prompt_1"));
        assert_eq!(graph.edges.len(), 1);
        assert_eq!(graph.edges[0].rule, Some(json!({"when": "up"})));
    }

    #[test]
    fn test_json_encoded_columns() {
        let graph = normalize_composite_graph(&json!({
            "nodesJson": "[{\"id\":\"n1\",\"kind\":\"local\",\"refId\":\"l\"}]",
            "edgesJson": "not json"
        }));
        assert_eq!(graph.nodes.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[test]
    fn test_duplicate_ids_keep_first() {
        let graph = normalize_composite_graph(&json!({
            "nodes": [
                {"id": "a", "kind": "local", "refId": "first"},
                {"id": "a", "kind": "ai", "refId": "second"}
            ]
        }));
        assert_eq!(graph.nodes, vec![CompositeNode::local("a", "first")]);
        assert_eq!(graph.duplicate_node_ids, vec!["a"]);
    }

    #[test]
    fn test_unknown_policy_and_mode() {
        let graph = normalize_composite_graph(&json!({
            "combineMode": "vote",
            "outputPolicy": "majority"
        }));
        assert_eq!(graph.combine_mode, CombineMode::Other("vote".to_string()));
        assert_eq!(graph.output_policy, OutputPolicy::FirstNonNeutral);
    }

    #[test]
    fn test_local_config_carried() {
        let graph = normalize_composite_graph(&json!({
            "nodes": [{"id": "a", "kind": "local", "refId": "l", "config": {"maxVolZ": 2.0}}]
        }));
        match &graph.nodes[0] {
            CompositeNode::Local { config, .. } => assert_eq!(config["maxVolZ"], 2.0),
            other => panic!("Expected local node, got {:?}", other),
        }
    }

    #[test]
    fn test_non_object_input_is_empty_graph() {
        for raw in [json!(null), json!("graph"), json!([1, 2, 3])] {
            let graph = normalize_composite_graph(&raw);
            assert!(graph.nodes.is_empty());
            assert!(graph.edges.is_empty());
        }
    }

    #[test]
    fn test_request_graph() {
        let req = CompositeRunRequest {
            composite_id: "c9".into(),
            output_policy: Some("override_by_confidence".into()),
            nodes_json: json!([{"id": "x", "kind": "ai", "refId": "p"}]),
            ..Default::default()
        };
        let graph = req.graph();
        assert_eq!(graph.composite_id, "c9");
        assert_eq!(graph.output_policy, OutputPolicy::OverrideByConfidence);
        assert_eq!(graph.nodes.len(), 1);
    }
}
