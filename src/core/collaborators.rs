// SPDX-License-Identifier: MIT

//! Collaborator interfaces injected into the composite engine
//!
//! The engine never talks to strategy registries, prompt stores or AI
//! providers directly. Production code implements these traits against the
//! real backends; tests implement deterministic fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::composite::state::{DecisionState, Signal};
use crate::composite::types::CompositeNode;
use crate::core::error::Result;

/// Input handed to a local strategy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStrategyContext {
    pub config: Value,
    pub feature_snapshot: Value,
    pub current_prediction: DecisionState,
}

/// Verdict of a local strategy for one market update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalStrategyResult {
    pub strategy_id: String,
    pub strategy_type: String,
    pub strategy_name: String,
    pub version: String,
    pub is_enabled: bool,
    pub allow: bool,
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub tags: Vec<String>,
    pub explanation: String,
    pub config_hash: String,
    pub snapshot_hash: String,
    pub meta: Value,
}

/// Input to the AI gating policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiGateContext {
    pub prediction: DecisionState,
    pub feature_snapshot: Value,
    pub composite_id: String,
    pub node_id: String,
    pub template_id: String,
    pub ai_calls_used: usize,
    pub max_ai_calls_per_run: usize,
}

/// Whether the AI path should run for the current decision state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct GatingDecision {
    pub allow: bool,
    pub reason_codes: Vec<String>,
    pub priority: String,
    pub recommended_cooldown_sec: u64,
    pub prediction_hash: String,
    pub history_hash: String,
    pub decision_hash: String,
    pub state: Value,
}

/// Runtime prompt configuration for an AI template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PromptSettings {
    pub template_id: String,
    pub name: String,
    pub instructions: String,
    pub model_name: Option<String>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
}

/// Input to the explanation generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplanationContext {
    pub composite_id: String,
    pub node_id: String,
    pub prediction: DecisionState,
    pub feature_snapshot: Value,
    pub prompt_settings: PromptSettings,
    pub gate: GatingDecision,
}

/// Prediction authored by an AI node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AiPrediction {
    pub signal: Signal,
    pub confidence: f64,
    pub expected_move_pct: f64,
}

/// Explanation and prediction returned by the AI provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AiExplanation {
    pub explanation: String,
    pub tags: Vec<String>,
    pub key_drivers: Vec<String>,
    pub ai_prediction: AiPrediction,
    pub disclaimer: String,
}

/// Checks whether a node's `ref_id` exists in the registry for its kind
#[async_trait]
pub trait RefResolver: Send + Sync {
    async fn resolve_ref(&self, node: &CompositeNode) -> Result<bool>;
}

/// Everything the pipeline executor needs from the outside world
#[async_trait]
pub trait CompositeCollaborators: Send + Sync {
    /// Reference checker used during validation.
    ///
    /// `None` keeps validation structural-only.
    fn ref_resolver(&self) -> Option<&dyn RefResolver> {
        None
    }

    /// Run the local strategy identified by `ref_id`
    async fn run_local_strategy(
        &self,
        ref_id: &str,
        ctx: LocalStrategyContext,
    ) -> Result<LocalStrategyResult>;

    /// Gating policy for AI nodes. Synchronous by contract.
    fn should_invoke_ai_explain(&self, ctx: &AiGateContext) -> GatingDecision;

    /// Resolve the prompt configuration of an AI template
    async fn get_runtime_prompt_settings(&self, template_id: &str) -> Result<PromptSettings>;

    /// Ask the AI provider for an explanation and prediction
    async fn generate_prediction_explanation(
        &self,
        ctx: ExplanationContext,
    ) -> Result<AiExplanation>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_local_result_tolerates_missing_fields() {
        let result: LocalStrategyResult =
            serde_json::from_value(json!({"allow": false, "reasonCodes": ["volatility_guard"]}))
                .unwrap();
        assert!(!result.allow);
        assert_eq!(result.reason_codes, vec!["volatility_guard"]);
        assert!(result.tags.is_empty());
    }

    #[test]
    fn test_ai_explanation_parses_camel_case() {
        let explanation: AiExplanation = serde_json::from_value(json!({
            "explanation": "Momentum building",
            "tags": ["breakout"],
            "keyDrivers": ["volume"],
            "aiPrediction": {"signal": "up", "confidence": 0.7, "expectedMovePct": 1.2},
            "disclaimer": "Not financial advice"
        }))
        .unwrap();
        assert_eq!(explanation.ai_prediction.signal, Signal::Up);
        assert_eq!(explanation.key_drivers, vec!["volume"]);
    }
}
