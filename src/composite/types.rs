// SPDX-License-Identifier: MIT

//! Composite graph type definitions
//!
//! Canonical in-memory shapes produced by the normalizer and consumed by the
//! validator, executor and merger. Everything here serializes as camelCase
//! JSON so results can go straight to logging pipelines or HTTP clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::state::{BasePrediction, Signal};
use crate::core::collaborators::{AiExplanation, GatingDecision, LocalStrategyResult};

/// How node outputs are combined
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CombineMode {
    /// Nodes run one after another in topological order
    #[default]
    Pipeline,
    /// Accepted for forward compatibility, not executable
    Other(String),
}

impl CombineMode {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "pipeline" => CombineMode::Pipeline,
            _ => CombineMode::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CombineMode::Pipeline => "pipeline",
            CombineMode::Other(s) => s,
        }
    }
}

impl Serialize for CombineMode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CombineMode {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CombineMode::parse(&raw))
    }
}

/// Rule used to collapse per-node outputs into one decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputPolicy {
    #[default]
    FirstNonNeutral,
    OverrideByConfidence,
}

impl OutputPolicy {
    /// Parse a persisted policy name; `None` for unknown values
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_non_neutral" => Some(OutputPolicy::FirstNonNeutral),
            "override_by_confidence" => Some(OutputPolicy::OverrideByConfidence),
            _ => None,
        }
    }
}

/// Kind discriminator for graph nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Local,
    Ai,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Local => "local",
            NodeKind::Ai => "ai",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the composite graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CompositeNode {
    /// Deterministic in-process strategy
    #[serde(rename_all = "camelCase")]
    Local {
        id: String,
        ref_id: String,
        #[serde(default = "empty_config")]
        config: Value,
    },
    /// LLM-backed strategy, gated and budget-limited
    #[serde(rename_all = "camelCase")]
    Ai { id: String, ref_id: String },
}

fn empty_config() -> Value {
    Value::Object(Default::default())
}

impl CompositeNode {
    pub fn local(id: impl Into<String>, ref_id: impl Into<String>) -> Self {
        CompositeNode::Local {
            id: id.into(),
            ref_id: ref_id.into(),
            config: empty_config(),
        }
    }

    pub fn ai(id: impl Into<String>, ref_id: impl Into<String>) -> Self {
        CompositeNode::Ai {
            id: id.into(),
            ref_id: ref_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CompositeNode::Local { id, .. } | CompositeNode::Ai { id, .. } => id,
        }
    }

    pub fn ref_id(&self) -> &str {
        match self {
            CompositeNode::Local { ref_id, .. } | CompositeNode::Ai { ref_id, .. } => ref_id,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            CompositeNode::Local { .. } => NodeKind::Local,
            CompositeNode::Ai { .. } => NodeKind::Ai,
        }
    }
}

/// A directed dependency between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEdge {
    pub from: String,
    pub to: String,
    /// Reserved for conditional routing; carried through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<Value>,
}

impl CompositeEdge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            rule: None,
        }
    }
}

/// Canonical composite graph
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeGraphDefinition {
    pub composite_id: String,
    pub combine_mode: CombineMode,
    pub output_policy: OutputPolicy,
    pub nodes: Vec<CompositeNode>,
    pub edges: Vec<CompositeEdge>,
    /// Ids of nodes dropped because an earlier node already used them
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub duplicate_node_ids: Vec<String>,
}

/// Outcome of structural and reference validation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topological_order: Option<Vec<String>>,
}

impl ValidationResult {
    pub(crate) fn from_parts(errors: Vec<String>, topological_order: Option<Vec<String>>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            topological_order,
        }
    }
}

/// Output of an executed AI node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiNodeOutput {
    pub gate: GatingDecision,
    pub explanation: AiExplanation,
    /// Decision as it stood right after this node ran
    pub decision: super::state::DecisionState,
}

/// Kind-specific node output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeOutput {
    Local(LocalStrategyResult),
    Ai(Box<AiNodeOutput>),
    /// Gate decision of an AI node the gate refused
    AiGate(GatingDecision),
}

/// One entry of the execution log, in execution order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionRecord {
    pub node_id: String,
    pub kind: NodeKind,
    pub ref_id: String,
    pub executed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<NodeOutput>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl NodeExecutionRecord {
    /// Prediction authored by this node, if it is an executed AI node
    pub fn ai_signal(&self) -> Option<Signal> {
        match &self.output {
            Some(NodeOutput::Ai(out)) if self.executed => Some(out.explanation.ai_prediction.signal),
            _ => None,
        }
    }
}

/// Request to run one composite strategy
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositeRunRequest {
    pub composite_id: String,
    pub combine_mode: Option<String>,
    pub output_policy: Option<String>,
    pub nodes_json: Value,
    pub edges_json: Value,
    pub feature_snapshot: Value,
    pub base_prediction: BasePrediction,
}

/// Final composite decision plus full execution visibility
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeRunResult {
    pub run_id: Uuid,
    pub composite_id: String,
    pub validation: ValidationResult,
    pub output_policy: OutputPolicy,
    pub signal: Signal,
    pub confidence: f64,
    pub expected_move_pct: f64,
    pub tags: Vec<String>,
    pub reason_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_drivers: Option<Vec<String>>,
    pub ai_calls_used: usize,
    pub nodes: Vec<NodeExecutionRecord>,
}

impl CompositeRunResult {
    /// Node ids in the order they were visited
    pub fn execution_order(&self) -> Vec<&str> {
        self.nodes.iter().map(|n| n.node_id.as_str()).collect()
    }
}
