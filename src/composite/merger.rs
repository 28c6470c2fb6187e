// SPDX-License-Identifier: MIT

//! Output merging - collapses the execution log into one decision

use serde::Serialize;

use super::state::{DecisionState, Signal};
use super::types::{NodeExecutionRecord, NodeKind, NodeOutput, OutputPolicy};

/// Final decision fields derived from a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDecision {
    pub signal: Signal,
    pub confidence: f64,
    pub expected_move_pct: f64,
    pub tags: Vec<String>,
    pub reason_codes: Vec<String>,
    pub explanation: Option<String>,
    pub key_drivers: Option<Vec<String>>,
    pub ai_calls_used: usize,
}

impl MergedDecision {
    fn from_state(state: &DecisionState, ai_calls_used: usize) -> Self {
        Self {
            signal: state.signal,
            confidence: state.confidence,
            expected_move_pct: state.expected_move_pct,
            tags: state.tags.iter().cloned().collect(),
            reason_codes: state.reason_codes.clone(),
            explanation: state.explanation.clone(),
            key_drivers: state.key_drivers.clone(),
            ai_calls_used,
        }
    }
}

/// Apply `policy` to the ordered records and the final state.
///
/// - `FirstNonNeutral`: the decision as of the first executed AI node whose
///   own prediction is not neutral; the final state when none is.
/// - `OverrideByConfidence`: the decision as of the last executed AI node
///   (recency only, confidences are not compared); the final state when no
///   AI node executed.
pub fn merge_composite_output(
    policy: OutputPolicy,
    records: &[NodeExecutionRecord],
    final_state: &DecisionState,
) -> MergedDecision {
    let ai_calls_used = records
        .iter()
        .filter(|r| r.executed && r.kind == NodeKind::Ai)
        .count();

    let mut executed_ai = records.iter().filter_map(|r| match &r.output {
        Some(NodeOutput::Ai(out)) if r.executed => Some(out),
        _ => None,
    });

    let chosen = match policy {
        OutputPolicy::FirstNonNeutral => {
            executed_ai.find(|out| !out.explanation.ai_prediction.signal.is_neutral())
        }
        OutputPolicy::OverrideByConfidence => executed_ai.last(),
    };

    match chosen {
        Some(out) => MergedDecision::from_state(&out.decision, ai_calls_used),
        None => MergedDecision::from_state(final_state, ai_calls_used),
    }
}
