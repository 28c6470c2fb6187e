// SPDX-License-Identifier: MIT

//! Deterministic gate deciding whether an AI node may call the provider
//!
//! Denials are reason codes, never errors. The gate also remembers which
//! decisions were recently explained so an unchanged market state is not
//! explained twice inside the cooldown window. Only a successful explanation
//! is remembered (see [`AiGatePolicy::commit`]); a failed provider call
//! leaves the node free to retry.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::core::collaborators::{AiGateContext, GatingDecision};
use crate::core::digest::{combine, hash_json};

pub const AI_GATE_NEUTRAL_SIGNAL: &str = "ai_gate_neutral_signal";
pub const AI_GATE_LOW_CONFIDENCE: &str = "ai_gate_low_confidence";
pub const AI_GATE_COOLDOWN: &str = "ai_gate_cooldown";
pub const AI_PROVIDER_UNAVAILABLE: &str = "ai_provider_unavailable";

/// Gate thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    /// Minimum decision confidence (0-100) before AI is consulted
    pub min_confidence_pct: f64,
    pub allow_neutral: bool,
    pub cooldown_sec: u64,
    pub high_priority_confidence_pct: f64,
    pub high_priority_move_pct: f64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            min_confidence_pct: 55.0,
            allow_neutral: false,
            cooldown_sec: 300,
            high_priority_confidence_pct: 75.0,
            high_priority_move_pct: 1.0,
        }
    }
}

pub struct AiGatePolicy {
    config: GateConfig,
    /// `compositeId:nodeId` -> (decision hash, explained at)
    recent: Mutex<HashMap<String, (String, DateTime<Utc>)>>,
}

impl AiGatePolicy {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            recent: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn decide(&self, ctx: &AiGateContext) -> GatingDecision {
        self.decide_at(ctx, Utc::now())
    }

    /// Start the cooldown for a node after its explanation succeeded
    pub fn commit(&self, composite_id: &str, node_id: &str, decision_hash: &str) {
        self.commit_at(composite_id, node_id, decision_hash, Utc::now())
    }

    pub(crate) fn commit_at(
        &self,
        composite_id: &str,
        node_id: &str,
        decision_hash: &str,
        now: DateTime<Utc>,
    ) {
        let mut recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
        recent.insert(
            cooldown_key(composite_id, node_id),
            (decision_hash.to_string(), now),
        );
    }

    /// Cooldown window, saturating for values chrono cannot represent
    fn cooldown(&self) -> Duration {
        i64::try_from(self.config.cooldown_sec)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }

    pub(crate) fn decide_at(&self, ctx: &AiGateContext, now: DateTime<Utc>) -> GatingDecision {
        let prediction = &ctx.prediction;
        let prediction_hash = hash_json(&json!({
            "signal": prediction.signal,
            "confidence": prediction.confidence,
            "expectedMovePct": prediction.expected_move_pct,
            "symbol": prediction.symbol,
            "timeframe": prediction.timeframe,
        }));
        let history_hash = hash_json(
            ctx.feature_snapshot
                .get("historyContext")
                .unwrap_or(&Value::Null),
        );
        let decision_hash = combine(&[
            prediction_hash.as_str(),
            history_hash.as_str(),
            ctx.template_id.as_str(),
        ]);

        let mut reason_codes = Vec::new();
        if prediction.signal.is_neutral() && !self.config.allow_neutral {
            reason_codes.push(AI_GATE_NEUTRAL_SIGNAL.to_string());
        }
        if prediction.confidence < self.config.min_confidence_pct {
            reason_codes.push(AI_GATE_LOW_CONFIDENCE.to_string());
        }

        let key = cooldown_key(&ctx.composite_id, &ctx.node_id);
        let cooldown = self.cooldown();
        let cooldown_remaining = {
            let recent = self.recent.lock().unwrap_or_else(|e| e.into_inner());
            match recent.get(&key) {
                Some((hash, at)) if *hash == decision_hash => cooldown
                    .checked_sub(&(now - *at))
                    .map(|left| left.num_seconds().max(0))
                    .unwrap_or(0),
                _ => 0,
            }
        };
        if cooldown_remaining > 0 {
            reason_codes.push(AI_GATE_COOLDOWN.to_string());
        }

        let allow = reason_codes.is_empty();

        let high = prediction.confidence >= self.config.high_priority_confidence_pct
            && prediction.expected_move_pct.abs() >= self.config.high_priority_move_pct;
        let priority = match (allow, high) {
            (false, _) => "low",
            (true, true) => "high",
            (true, false) => "normal",
        };

        log::debug!(
            "AI gate for {}:{} allow={} reasons={:?}",
            ctx.composite_id,
            ctx.node_id,
            allow,
            reason_codes
        );

        GatingDecision {
            allow,
            reason_codes,
            priority: priority.to_string(),
            recommended_cooldown_sec: if high {
                self.config.cooldown_sec / 2
            } else {
                self.config.cooldown_sec
            },
            prediction_hash,
            history_hash,
            decision_hash,
            state: json!({
                "signal": prediction.signal,
                "confidencePct": prediction.confidence,
                "minConfidencePct": self.config.min_confidence_pct,
                "cooldownRemainingSec": cooldown_remaining,
            }),
        }
    }
}

fn cooldown_key(composite_id: &str, node_id: &str) -> String {
    format!("{}:{}", composite_id, node_id)
}

/// Decision used when no AI provider is configured
pub fn provider_unavailable(ctx: &AiGateContext) -> GatingDecision {
    GatingDecision {
        allow: false,
        reason_codes: vec![AI_PROVIDER_UNAVAILABLE.to_string()],
        priority: "low".to_string(),
        state: json!({"templateId": ctx.template_id}),
        ..Default::default()
    }
}
