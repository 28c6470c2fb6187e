// SPDX-License-Identifier: MIT

//! `regime_gate` - requires a tradable market regime aligned with the EMA stack

use serde_json::{json, Value};

use super::{
    clamp_score, finite_f64, flag, label, section, string_list, LocalStrategy, StrategyInput,
    StrategyVerdict,
};
use crate::composite::state::Signal;

pub const STRATEGY_TYPE: &str = "regime_gate";

const DEFAULT_MIN_CONFIDENCE: f64 = 45.0;
const UNKNOWN_CONFIDENCE_SCORE: f64 = 50.0;
const BLOCKED_SCORE_CAP: f64 = 35.0;

pub struct RegimeGate;

impl LocalStrategy for RegimeGate {
    fn strategy_type(&self) -> &str {
        STRATEGY_TYPE
    }

    fn name(&self) -> &str {
        "Regime Gate"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn default_config(&self) -> Value {
        json!({
            "allowStates": ["trend_up", "trend_down", "transition"],
            "minRegimeConfidencePct": DEFAULT_MIN_CONFIDENCE,
            "requireStackAlignment": true,
            "allowUnknownRegime": false
        })
    }

    fn evaluate(&self, input: &StrategyInput<'_>) -> StrategyVerdict {
        let config = input.config;
        let reg = section(input.feature_snapshot, &["historyContext", "reg"]);
        let ema = section(input.feature_snapshot, &["historyContext", "ema"]);

        let state = label(reg.and_then(|r| r.get("state")));
        let conf = finite_f64(reg.and_then(|r| r.get("conf")));
        let stack = label(ema.and_then(|e| e.get("stk")));
        let signal = input.signal;

        let allow_states = string_list(config.get("allowStates"), false);
        let min_conf = finite_f64(config.get("minRegimeConfidencePct")).unwrap_or(DEFAULT_MIN_CONFIDENCE);
        let require_alignment = flag(config.get("requireStackAlignment"), true);
        let allow_unknown = flag(config.get("allowUnknownRegime"), false);

        let state_conflict = (state == "trend_up" && stack == "bear")
            || (state == "trend_down" && stack == "bull");
        let signal_conflict = (signal == Signal::Up && stack == "bear")
            || (signal == Signal::Down && stack == "bull");

        let reason = if state == "unknown" && !allow_unknown {
            Some("regime_unknown")
        } else if !allow_states.contains(&state) {
            Some("regime_state_not_allowed")
        } else if conf.is_some_and(|c| c < min_conf) {
            Some("regime_confidence_low")
        } else if require_alignment && state_conflict {
            Some("ema_stack_conflict")
        } else if require_alignment && signal_conflict {
            Some("signal_stack_conflict")
        } else {
            None
        };
        let allow = reason.is_none();

        let base = conf.unwrap_or(UNKNOWN_CONFIDENCE_SCORE);
        let score = clamp_score(if allow { base } else { base.min(BLOCKED_SCORE_CAP) });

        StrategyVerdict {
            allow,
            score,
            reason_codes: reason.into_iter().map(str::to_string).collect(),
            tags: vec![if allow { "regime_ok" } else { "regime_block" }.to_string()],
            explanation: if allow {
                "Regime gate passed with aligned structure context.".to_string()
            } else {
                "Regime gate blocked due to incompatible regime/EMA alignment.".to_string()
            },
            meta: json!({
                "regimeState": state,
                "regimeConfidencePct": conf,
                "emaStack": stack,
                "signal": signal,
                "minRegimeConfidencePct": min_conf,
                "requireStackAlignment": require_alignment,
            }),
        }
    }
}
