// SPDX-License-Identifier: MIT

//! Pipeline executor
//!
//! Walks the validated topological order one node at a time, threading a
//! single `DecisionState` through local and AI nodes. Nodes never run in
//! parallel: a node may read whatever its predecessors left in the state.

use chrono::Utc;
use serde_json::Value;
use std::time::Instant;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::engine::RunEvent;
use super::merger::merge_composite_output;
use super::state::{normalize_confidence, DecisionState};
use super::types::{
    AiNodeOutput, CombineMode, CompositeGraphDefinition, CompositeNode, CompositeRunRequest,
    CompositeRunResult, NodeExecutionRecord, NodeOutput, ValidationResult,
};
use super::validator::{validate_composite_graph, ValidateOptions};
use crate::core::collaborators::{
    AiExplanation, AiGateContext, CompositeCollaborators, ExplanationContext, GatingDecision,
    LocalStrategyContext,
};
use crate::core::error::{CompositeError, Result};

pub const AI_CALL_BUDGET_EXCEEDED: &str = "ai_call_budget_exceeded";
pub const AI_GATE_DENIED: &str = "ai_gate_denied";

/// Per-run execution limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub max_ai_calls_per_run: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_ai_calls_per_run: 1,
        }
    }
}

/// Normalize, validate and execute a composite strategy.
///
/// Invalid graphs come back as `Ok` with a neutral decision and the failed
/// validation attached; callers must check `validation.valid`. Collaborator
/// errors are returned as `Err` without retries.
pub async fn run_composite_strategy(
    request: &CompositeRunRequest,
    deps: &dyn CompositeCollaborators,
    options: RunOptions,
) -> Result<CompositeRunResult> {
    execute(request, deps, options, None).await
}

pub(crate) async fn execute(
    request: &CompositeRunRequest,
    deps: &dyn CompositeCollaborators,
    options: RunOptions,
    events: Option<&mpsc::Sender<RunEvent>>,
) -> Result<CompositeRunResult> {
    let run_id = Uuid::new_v4();
    let graph = request.graph();
    let validation = validate_composite_graph(
        &graph,
        ValidateOptions {
            resolver: deps.ref_resolver(),
        },
    )
    .await;
    emit(events, RunEvent::Validated(validation.clone())).await;

    let order = match validation.topological_order.clone() {
        Some(order) if validation.valid => order,
        _ => return Ok(rejected(run_id, &graph, validation)),
    };

    if let CombineMode::Other(mode) = &graph.combine_mode {
        return Err(CompositeError::UnsupportedCombineMode(mode.clone()));
    }

    log::info!(
        "Composite {} run {}: executing {} nodes: {:?}",
        graph.composite_id,
        run_id,
        order.len(),
        order
    );

    let mut run = PipelineRun {
        deps,
        graph: &graph,
        feature_snapshot: &request.feature_snapshot,
        max_ai_calls: options.max_ai_calls_per_run,
        state: DecisionState::seed(&request.base_prediction, &request.feature_snapshot),
        ai_calls_used: 0,
        records: Vec::with_capacity(order.len()),
    };

    for node_id in &order {
        let Some(node) = graph.nodes.iter().find(|n| n.id() == node_id) else {
            continue;
        };
        let record = run.execute_node(node).await?;
        emit(events, RunEvent::NodeFinished(record.clone())).await;
        run.records.push(record);
    }

    let merged = merge_composite_output(graph.output_policy, &run.records, &run.state);
    log::info!(
        "Composite {} run {} finished: signal={} confidence={:.1} ai_calls={}",
        graph.composite_id,
        run_id,
        merged.signal,
        merged.confidence,
        merged.ai_calls_used
    );

    Ok(CompositeRunResult {
        run_id,
        composite_id: graph.composite_id.clone(),
        validation,
        output_policy: graph.output_policy,
        signal: merged.signal,
        confidence: merged.confidence,
        expected_move_pct: merged.expected_move_pct,
        tags: merged.tags,
        reason_codes: merged.reason_codes,
        explanation: merged.explanation,
        key_drivers: merged.key_drivers,
        ai_calls_used: merged.ai_calls_used,
        nodes: run.records,
    })
}

/// Result for a graph that failed validation: neutral, nothing executed
fn rejected(
    run_id: Uuid,
    graph: &CompositeGraphDefinition,
    validation: ValidationResult,
) -> CompositeRunResult {
    let neutral = DecisionState::neutral();
    CompositeRunResult {
        run_id,
        composite_id: graph.composite_id.clone(),
        validation,
        output_policy: graph.output_policy,
        signal: neutral.signal,
        confidence: neutral.confidence,
        expected_move_pct: neutral.expected_move_pct,
        tags: vec![],
        reason_codes: vec![],
        explanation: None,
        key_drivers: None,
        ai_calls_used: 0,
        nodes: vec![],
    }
}

async fn emit(events: Option<&mpsc::Sender<RunEvent>>, event: RunEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening anymore
        let _ = tx.send(event).await;
    }
}

struct PipelineRun<'a> {
    deps: &'a dyn CompositeCollaborators,
    graph: &'a CompositeGraphDefinition,
    feature_snapshot: &'a Value,
    max_ai_calls: usize,
    state: DecisionState,
    ai_calls_used: usize,
    records: Vec<NodeExecutionRecord>,
}

/// Outcome of a node handler before timing is attached
enum NodeOutcome {
    Executed(NodeOutput),
    Skipped {
        reason: String,
        output: Option<NodeOutput>,
    },
}

impl PipelineRun<'_> {
    async fn execute_node(&mut self, node: &CompositeNode) -> Result<NodeExecutionRecord> {
        log::info!("Executing node: {} ({}:{})", node.id(), node.kind(), node.ref_id());
        let started_at = Utc::now();
        let clock = Instant::now();

        let outcome = match node {
            CompositeNode::Local { ref_id, config, .. } => {
                self.execute_local(ref_id, config).await?
            }
            CompositeNode::Ai { id, ref_id } => self.execute_ai(id, ref_id).await?,
        };

        let (executed, skipped_reason, output) = match outcome {
            NodeOutcome::Executed(output) => {
                log::info!("Node {} completed", node.id());
                (true, None, Some(output))
            }
            NodeOutcome::Skipped { reason, output } => {
                log::info!("Node {} skipped: {}", node.id(), reason);
                (false, Some(reason), output)
            }
        };

        Ok(NodeExecutionRecord {
            node_id: node.id().to_string(),
            kind: node.kind(),
            ref_id: node.ref_id().to_string(),
            executed,
            skipped_reason,
            output,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
        })
    }

    /// Local nodes annotate the state; they never author the signal
    async fn execute_local(&mut self, ref_id: &str, config: &Value) -> Result<NodeOutcome> {
        let ctx = LocalStrategyContext {
            config: config.clone(),
            feature_snapshot: self.feature_snapshot.clone(),
            current_prediction: self.state.clone(),
        };
        let result = self.deps.run_local_strategy(ref_id, ctx).await?;

        if !result.allow {
            log::debug!(
                "Local strategy {} denied: {:?}",
                ref_id,
                result.reason_codes
            );
        }
        self.state.merge_tags(&result.tags);
        self.state.merge_reason_codes(&result.reason_codes);

        Ok(NodeOutcome::Executed(NodeOutput::Local(result)))
    }

    async fn execute_ai(&mut self, node_id: &str, ref_id: &str) -> Result<NodeOutcome> {
        // Budget is checked before the gate so an exhausted run never
        // consults the gating policy
        if self.ai_calls_used >= self.max_ai_calls {
            return Ok(NodeOutcome::Skipped {
                reason: AI_CALL_BUDGET_EXCEEDED.to_string(),
                output: None,
            });
        }

        let gate_ctx = AiGateContext {
            prediction: self.state.clone(),
            feature_snapshot: self.feature_snapshot.clone(),
            composite_id: self.graph.composite_id.clone(),
            node_id: node_id.to_string(),
            template_id: ref_id.to_string(),
            ai_calls_used: self.ai_calls_used,
            max_ai_calls_per_run: self.max_ai_calls,
        };
        let gate = self.deps.should_invoke_ai_explain(&gate_ctx);
        if !gate.allow {
            let reason = gate
                .reason_codes
                .first()
                .cloned()
                .unwrap_or_else(|| AI_GATE_DENIED.to_string());
            return Ok(NodeOutcome::Skipped {
                reason,
                output: Some(NodeOutput::AiGate(gate)),
            });
        }

        self.ai_calls_used += 1;
        let prompt_settings = self.deps.get_runtime_prompt_settings(ref_id).await?;
        let explanation = self
            .deps
            .generate_prediction_explanation(ExplanationContext {
                composite_id: self.graph.composite_id.clone(),
                node_id: node_id.to_string(),
                prediction: self.state.clone(),
                feature_snapshot: self.feature_snapshot.clone(),
                prompt_settings,
                gate: gate.clone(),
            })
            .await?;

        self.apply_explanation(&explanation);

        Ok(NodeOutcome::Executed(NodeOutput::Ai(Box::new(AiNodeOutput {
            gate: with_budget_state(gate, self.ai_calls_used, self.max_ai_calls),
            explanation,
            decision: self.state.clone(),
        }))))
    }

    fn apply_explanation(&mut self, explanation: &AiExplanation) {
        let prediction = &explanation.ai_prediction;
        self.state.signal = prediction.signal;
        self.state.confidence = normalize_confidence(prediction.confidence);
        self.state.expected_move_pct = if prediction.expected_move_pct.is_finite() {
            prediction.expected_move_pct
        } else {
            0.0
        };
        self.state.merge_tags(&explanation.tags);
        if !explanation.explanation.trim().is_empty() {
            self.state.explanation = Some(explanation.explanation.clone());
        }
        if !explanation.key_drivers.is_empty() {
            self.state.key_drivers = Some(explanation.key_drivers.clone());
        }
    }
}

/// Record the budget position next to the gate's own state for observability
fn with_budget_state(mut gate: GatingDecision, used: usize, max: usize) -> GatingDecision {
    if let Value::Object(map) = &mut gate.state {
        map.insert("aiCallsUsed".to_string(), used.into());
        map.insert("maxAiCallsPerRun".to_string(), max.into());
    }
    gate
}
