//! Integration tests for composite graph validation and execution
//!
//! These tests drive the public engine API end to end with scripted
//! collaborators standing in for strategy registries and the AI provider.

use async_trait::async_trait;
use composite_rs::composite::{
    run_composite_strategy, CompositeEngine, CompositeNode, CompositeRunRequest, NodeOutput,
    RequestLoader, RunEvent, RunOptions, Signal,
};
use composite_rs::core::{
    AiExplanation, AiGateContext, AiPrediction, CompositeCollaborators, CompositeError,
    ExplanationContext, GatingDecision, LocalStrategyContext, LocalStrategyResult,
    PromptSettings, RefResolver, Result,
};
use once_cell::sync::Lazy;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// ============================================================================
// Mock Components
// ============================================================================

static SNAPSHOT: Lazy<Value> = Lazy::new(|| {
    json!({
        "tags": ["trend_up"],
        "historyContext": {"reg": {"state": "trend_up", "conf": 64}, "vol": {"z": 0.8}}
    })
});

/// Scripted collaborators.
///
/// Local refs starting with `block` deny; AI answers come from `ai_signals`
/// keyed by template id (default neutral). Refs listed in `unknown` fail
/// resolution.
#[derive(Default)]
struct Scripted {
    ai_signals: HashMap<String, (Signal, f64)>,
    unknown: Vec<String>,
    deny_gate: bool,
    fail_prompt: bool,
    with_resolver: bool,
    resolve_calls: AtomicUsize,
    local_calls: AtomicUsize,
    gate_calls: AtomicUsize,
    explain_calls: AtomicUsize,
    gate_budgets: Mutex<Vec<(usize, usize)>>,
}

impl Scripted {
    fn new() -> Self {
        Self {
            with_resolver: true,
            ..Default::default()
        }
    }

    fn ai(mut self, template: &str, signal: Signal, confidence: f64) -> Self {
        self.ai_signals
            .insert(template.to_string(), (signal, confidence));
        self
    }
}

#[async_trait]
impl RefResolver for Scripted {
    async fn resolve_ref(&self, node: &CompositeNode) -> Result<bool> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        Ok(!self.unknown.iter().any(|r| r == node.ref_id()))
    }
}

#[async_trait]
impl CompositeCollaborators for Scripted {
    fn ref_resolver(&self) -> Option<&dyn RefResolver> {
        if self.with_resolver {
            Some(self)
        } else {
            None
        }
    }

    async fn run_local_strategy(
        &self,
        ref_id: &str,
        _ctx: LocalStrategyContext,
    ) -> Result<LocalStrategyResult> {
        self.local_calls.fetch_add(1, Ordering::SeqCst);
        let allow = !ref_id.starts_with("block");
        Ok(LocalStrategyResult {
            strategy_id: ref_id.to_string(),
            allow,
            score: if allow { 70.0 } else { 20.0 },
            reason_codes: if allow {
                vec![]
            } else {
                vec!["blocked_tag_match".to_string()]
            },
            tags: vec![format!("{}_seen", ref_id)],
            ..Default::default()
        })
    }

    fn should_invoke_ai_explain(&self, ctx: &AiGateContext) -> GatingDecision {
        self.gate_calls.fetch_add(1, Ordering::SeqCst);
        self.gate_budgets
            .lock()
            .unwrap()
            .push((ctx.ai_calls_used, ctx.max_ai_calls_per_run));
        GatingDecision {
            allow: !self.deny_gate,
            reason_codes: if self.deny_gate {
                vec![]
            } else {
                vec!["ok".to_string()]
            },
            state: json!({}),
            ..Default::default()
        }
    }

    async fn get_runtime_prompt_settings(&self, template_id: &str) -> Result<PromptSettings> {
        if self.fail_prompt {
            return Err(CompositeError::PromptNotFound(template_id.to_string()));
        }
        Ok(PromptSettings {
            template_id: template_id.to_string(),
            ..Default::default()
        })
    }

    async fn generate_prediction_explanation(
        &self,
        ctx: ExplanationContext,
    ) -> Result<AiExplanation> {
        self.explain_calls.fetch_add(1, Ordering::SeqCst);
        let (signal, confidence) = self
            .ai_signals
            .get(&ctx.prompt_settings.template_id)
            .copied()
            .unwrap_or((Signal::Neutral, 0.5));
        Ok(AiExplanation {
            explanation: format!("{} says {}", ctx.prompt_settings.template_id, signal),
            tags: vec![format!("{}_tag", ctx.prompt_settings.template_id)],
            key_drivers: vec!["structure".to_string()],
            ai_prediction: AiPrediction {
                signal,
                confidence,
                expected_move_pct: 0.9,
            },
            disclaimer: String::new(),
        })
    }
}

fn request(nodes: Value, edges: Value) -> CompositeRunRequest {
    CompositeRunRequest {
        composite_id: "it".to_string(),
        nodes_json: nodes,
        edges_json: edges,
        feature_snapshot: SNAPSHOT.clone(),
        ..Default::default()
    }
}

fn budget(max: usize) -> RunOptions {
    RunOptions {
        max_ai_calls_per_run: max,
    }
}

// ============================================================================
// Ordering and validation
// ============================================================================

#[tokio::test]
async fn test_linear_graph_runs_in_edge_order() {
    let deps = Scripted::new();
    let req = request(
        json!([
            {"id": "n3", "kind": "local", "refId": "l3"},
            {"id": "n2", "kind": "local", "refId": "l2"},
            {"id": "n1", "kind": "local", "refId": "l1"}
        ]),
        json!([{"from": "n1", "to": "n2"}, {"from": "n2", "to": "n3"}]),
    );

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.execution_order(), vec!["n1", "n2", "n3"]);
    assert_eq!(
        result.validation.topological_order,
        Some(vec!["n1".to_string(), "n2".to_string(), "n3".to_string()])
    );
    assert_eq!(result.ai_calls_used, 0);
    assert_eq!(deps.gate_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_two_node_cycle_rejected() {
    let deps = Scripted::new();
    let req = request(
        json!([
            {"id": "n1", "kind": "local", "refId": "local_1"},
            {"id": "n2", "kind": "ai", "refId": "prompt_1"}
        ]),
        json!([{"from": "n1", "to": "n2"}, {"from": "n2", "to": "n1"}]),
    );

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert!(!result.validation.valid);
    assert!(result
        .validation
        .errors
        .contains(&"graph_cycle_detected".to_string()));
    assert!(result.validation.topological_order.is_none());
    assert!(result.nodes.is_empty());
    assert_eq!(result.signal, Signal::Neutral);
    assert_eq!(deps.local_calls.load(Ordering::SeqCst), 0);
    // References are still checked on cyclic graphs
    assert_eq!(deps.resolve_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_missing_local_ref_rejected_before_execution() {
    let mut deps = Scripted::new();
    deps.unknown = vec!["local_missing".to_string()];
    let req = request(
        json!([
            {"id": "n1", "kind": "local", "refId": "local_missing"},
            {"id": "n2", "kind": "ai", "refId": "prompt_1"}
        ]),
        json!([{"from": "n1", "to": "n2"}]),
    );

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert!(!result.validation.valid);
    assert!(result
        .validation
        .errors
        .contains(&"node_ref_not_found:local:local_missing".to_string()));
    assert!(result.nodes.is_empty());
    assert_eq!(deps.local_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_structural_only_validation_without_resolver() {
    let mut deps = Scripted::new();
    deps.with_resolver = false;
    deps.unknown = vec!["whatever".to_string()];
    let req = request(
        json!([{"id": "a", "kind": "local", "refId": "whatever"}]),
        json!([]),
    );

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert!(result.validation.valid);
    assert_eq!(deps.resolve_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.nodes.len(), 1);
}

// ============================================================================
// AI budget and gating
// ============================================================================

#[tokio::test]
async fn test_budget_caps_gate_calls() {
    let deps = Scripted::new()
        .ai("p1", Signal::Up, 0.7)
        .ai("p2", Signal::Down, 0.9)
        .ai("p3", Signal::Down, 0.9);
    let req = request(
        json!([
            {"id": "a1", "kind": "ai", "refId": "p1"},
            {"id": "a2", "kind": "ai", "refId": "p2"},
            {"id": "a3", "kind": "ai", "refId": "p3"}
        ]),
        json!([{"from": "a1", "to": "a2"}, {"from": "a2", "to": "a3"}]),
    );

    let result = run_composite_strategy(&req, &deps, budget(2)).await.unwrap();

    assert_eq!(result.ai_calls_used, 2);
    assert_eq!(deps.gate_calls.load(Ordering::SeqCst), 2);
    assert_eq!(deps.explain_calls.load(Ordering::SeqCst), 2);
    assert_eq!(*deps.gate_budgets.lock().unwrap(), vec![(0, 2), (1, 2)]);

    let last = &result.nodes[2];
    assert!(!last.executed);
    assert_eq!(last.skipped_reason.as_deref(), Some("ai_call_budget_exceeded"));
    assert!(last.output.is_none());
}

#[tokio::test]
async fn test_zero_budget_never_calls_gate() {
    let deps = Scripted::new().ai("p1", Signal::Up, 0.7);
    let req = request(json!([{"id": "a1", "kind": "ai", "refId": "p1"}]), json!([]));

    let result = run_composite_strategy(&req, &deps, budget(0)).await.unwrap();

    assert_eq!(deps.gate_calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.ai_calls_used, 0);
    assert_eq!(
        result.nodes[0].skipped_reason.as_deref(),
        Some("ai_call_budget_exceeded")
    );
}

#[tokio::test]
async fn test_gate_denial_without_codes_uses_fallback_reason() {
    let mut deps = Scripted::new();
    deps.deny_gate = true;
    let req = request(json!([{"id": "a1", "kind": "ai", "refId": "p1"}]), json!([]));

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.nodes[0].skipped_reason.as_deref(), Some("ai_gate_denied"));
    assert_eq!(deps.explain_calls.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Decision semantics
// ============================================================================

#[tokio::test]
async fn test_blocking_local_does_not_override_ai_signal() {
    let deps = Scripted::new().ai("p1", Signal::Up, 0.72);
    let req = request(
        json!([
            {"id": "filter", "kind": "local", "refId": "block_news"},
            {"id": "explain", "kind": "ai", "refId": "p1"}
        ]),
        json!([{"from": "filter", "to": "explain"}]),
    );

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.signal, Signal::Up);
    assert_eq!(result.confidence, 72.0);
    match &result.nodes[0].output {
        Some(NodeOutput::Local(local)) => assert!(!local.allow),
        other => panic!("Expected local output, got {:?}", other),
    }
    assert!(result.reason_codes.contains(&"blocked_tag_match".to_string()));
    assert!(result.tags.contains(&"block_news_seen".to_string()));
    assert!(result.tags.contains(&"p1_tag".to_string()));
}

#[tokio::test]
async fn test_blocking_local_keeps_base_signal() {
    let deps = Scripted::new();
    let mut req = request(
        json!([{"id": "filter", "kind": "local", "refId": "block_all"}]),
        json!([]),
    );
    req.base_prediction = serde_json::from_value(json!({
        "signal": "down",
        "confidence": 0.61,
        "expectedMovePct": -1.2
    }))
    .unwrap();

    let result = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap();

    assert_eq!(result.signal, Signal::Down);
    assert_eq!(result.confidence, 61.0);
    assert_eq!(result.expected_move_pct, -1.2);
}

#[tokio::test]
async fn test_first_non_neutral_policy() {
    let deps = Scripted::new()
        .ai("quiet", Signal::Neutral, 0.4)
        .ai("bull", Signal::Up, 0.6)
        .ai("bear", Signal::Down, 0.95);
    let mut req = request(
        json!([
            {"id": "a", "kind": "ai", "refId": "quiet"},
            {"id": "b", "kind": "ai", "refId": "bull"},
            {"id": "c", "kind": "ai", "refId": "bear"}
        ]),
        json!([{"from": "a", "to": "b"}, {"from": "b", "to": "c"}]),
    );
    req.output_policy = Some("first_non_neutral".to_string());

    let result = run_composite_strategy(&req, &deps, budget(3)).await.unwrap();

    assert_eq!(result.signal, Signal::Up);
    assert_eq!(result.confidence, 60.0);
    assert_eq!(result.explanation.as_deref(), Some("bull says up"));
    // The bear node still ran and is visible in the log
    assert_eq!(result.ai_calls_used, 3);
    assert_eq!(result.nodes[2].ai_signal(), Some(Signal::Down));
}

#[tokio::test]
async fn test_override_policy_is_last_wins() {
    let deps = Scripted::new()
        .ai("strong", Signal::Up, 0.95)
        .ai("weak", Signal::Down, 0.3);
    let mut req = request(
        json!([
            {"id": "a", "kind": "ai", "refId": "strong"},
            {"id": "b", "kind": "ai", "refId": "weak"}
        ]),
        json!([{"from": "a", "to": "b"}]),
    );
    req.output_policy = Some("override_by_confidence".to_string());

    let result = run_composite_strategy(&req, &deps, budget(2)).await.unwrap();

    assert_eq!(result.signal, Signal::Down);
    assert_eq!(result.confidence, 30.0);
}

// ============================================================================
// Errors and streaming
// ============================================================================

#[tokio::test]
async fn test_collaborator_error_propagates() {
    let mut deps = Scripted::new();
    deps.fail_prompt = true;
    let req = request(json!([{"id": "a", "kind": "ai", "refId": "p1"}]), json!([]));

    let err = run_composite_strategy(&req, &deps, RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "prompt_template_not_found:p1");
}

#[tokio::test]
async fn test_engine_stream_from_yaml_request() {
    let yaml = r#"
compositeId: streamed
nodesJson:
  - {id: filter, kind: local, refId: signal_filter}
  - {id: explain, kind: ai, refId: p1}
edgesJson:
  - {from: filter, to: explain}
basePrediction:
  signal: up
  confidence: 55
"#;
    let req: CompositeRunRequest = RequestLoader::parse_yaml(yaml).unwrap();
    let engine = CompositeEngine::new(Arc::new(Scripted::new().ai("p1", Signal::Up, 0.8)));
    let (tx, mut rx) = mpsc::channel(16);

    let handle = tokio::spawn(async move { engine.run_stream(&req, tx).await });

    let mut names = vec![];
    while let Some(event) = rx.recv().await {
        if let RunEvent::Completed(result) = &event {
            assert_eq!(result.composite_id, "streamed");
            assert_eq!(result.signal, Signal::Up);
        }
        names.push(event.name());
    }
    assert_eq!(
        names,
        vec!["validated", "node_finished", "node_finished", "completed"]
    );
    assert!(handle.await.unwrap().is_ok());
}
