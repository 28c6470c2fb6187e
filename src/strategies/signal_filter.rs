// SPDX-License-Identifier: MIT

//! `signal_filter` - blocks updates on tag, volatility and range-state rules

use serde_json::{json, Value};

use super::{
    clamp_score, finite_f64, flag, label, section, string_list, LocalStrategy, StrategyInput,
    StrategyVerdict,
};

pub const STRATEGY_TYPE: &str = "signal_filter";

const DEFAULT_MAX_VOL_Z: f64 = 2.5;
const BASE_SCORE: f64 = 70.0;
const BLOCKED_SCORE_CAP: f64 = 30.0;

pub struct SignalFilter;

impl LocalStrategy for SignalFilter {
    fn strategy_type(&self) -> &str {
        STRATEGY_TYPE
    }

    fn name(&self) -> &str {
        "Signal Filter"
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn default_config(&self) -> Value {
        json!({
            "blockedTags": ["data_gap", "news_risk"],
            "requiredTags": [],
            "maxVolZ": DEFAULT_MAX_VOL_Z,
            "blockRangeStates": ["range"],
            "allowRangeWhenTrendTag": false
        })
    }

    fn evaluate(&self, input: &StrategyInput<'_>) -> StrategyVerdict {
        let config = input.config;
        let tags = string_list(input.feature_snapshot.get("tags"), true);
        let state = label(
            section(input.feature_snapshot, &["historyContext", "reg"]).and_then(|r| r.get("state")),
        );
        let vol_z = finite_f64(
            section(input.feature_snapshot, &["historyContext", "vol"]).and_then(|v| v.get("z")),
        );

        let blocked_tags = string_list(config.get("blockedTags"), true);
        let required_tags = string_list(config.get("requiredTags"), true);
        let block_range_states = string_list(config.get("blockRangeStates"), false);
        let allow_range_with_trend = flag(config.get("allowRangeWhenTrendTag"), false);
        let max_vol_z = finite_f64(config.get("maxVolZ")).unwrap_or(DEFAULT_MAX_VOL_Z);

        let has_tag = |t: &String| tags.contains(t);
        let has_trend_tag = tags.iter().any(|t| t == "trend_up" || t == "trend_down");

        // First failing rule wins
        let reason = if blocked_tags.iter().any(has_tag) {
            Some("blocked_tag_match")
        } else if !required_tags.is_empty() && !required_tags.iter().all(has_tag) {
            Some("required_tag_missing")
        } else if vol_z.is_some_and(|z| z.abs() > max_vol_z) {
            Some("volatility_guard")
        } else if block_range_states.contains(&state) && !(allow_range_with_trend && has_trend_tag)
        {
            Some("range_state_block")
        } else {
            None
        };
        let allow = reason.is_none();

        let mut score = match vol_z {
            Some(z) => clamp_score(BASE_SCORE - (z.abs() - 1.0).max(0.0) * 10.0),
            None => BASE_SCORE,
        };
        if !allow {
            score = score.min(BLOCKED_SCORE_CAP);
        }

        StrategyVerdict {
            allow,
            score,
            reason_codes: reason.into_iter().map(str::to_string).collect(),
            tags: vec![if allow {
                "signal_filter_ok".to_string()
            } else {
                "signal_filter_block".to_string()
            }],
            explanation: if allow {
                "Signal filter passed with acceptable tag/volatility regime context.".to_string()
            } else {
                "Signal filter blocked due to tag, volatility, or range-state restrictions."
                    .to_string()
            },
            meta: json!({
                "tags": tags,
                "blockedTags": blocked_tags,
                "requiredTags": required_tags,
                "regimeState": state,
                "volZ": vol_z,
                "maxVolZ": max_vol_z,
                "allowRangeWhenTrendTag": allow_range_with_trend,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composite::state::Signal;
    use crate::strategies::merge_config;

    fn evaluate(overrides: Value, snapshot: Value) -> StrategyVerdict {
        let config = merge_config(&SignalFilter.default_config(), &[&overrides]);
        SignalFilter.evaluate(&StrategyInput {
            config: &config,
            feature_snapshot: &snapshot,
            signal: Signal::Up,
        })
    }

    #[test]
    fn test_passes_clean_snapshot() {
        let verdict = evaluate(
            json!({}),
            json!({"tags": ["trend_up"], "historyContext": {"reg": {"state": "trend_up"}, "vol": {"z": 0.5}}}),
        );
        assert!(verdict.allow);
        assert_eq!(verdict.score, 70.0);
        assert_eq!(verdict.tags, vec!["signal_filter_ok"]);
        assert!(verdict.reason_codes.is_empty());
    }

    #[test]
    fn test_blocked_tag_is_case_insensitive() {
        let verdict = evaluate(json!({}), json!({"tags": ["News_Risk"]}));
        assert!(!verdict.allow);
        assert_eq!(verdict.reason_codes, vec!["blocked_tag_match"]);
        assert_eq!(verdict.score, 30.0);
    }

    #[test]
    fn test_required_tag_missing() {
        let verdict = evaluate(json!({"requiredTags": ["breakout"]}), json!({"tags": ["trend_up"]}));
        assert_eq!(verdict.reason_codes, vec!["required_tag_missing"]);
    }

    #[test]
    fn test_volatility_guard_and_score() {
        let verdict = evaluate(json!({}), json!({"historyContext": {"vol": {"z": -3.0}}}));
        assert!(!verdict.allow);
        assert_eq!(verdict.reason_codes, vec!["volatility_guard"]);
        // 70 - (3 - 1) * 10 = 50, then capped at 30 when blocked
        assert_eq!(verdict.score, 30.0);

        let verdict = evaluate(json!({"maxVolZ": 5}), json!({"historyContext": {"vol": {"z": 2.0}}}));
        assert!(verdict.allow);
        assert_eq!(verdict.score, 60.0);
    }

    #[test]
    fn test_range_state_with_trend_override() {
        let snapshot = json!({"tags": ["trend_down"], "historyContext": {"reg": {"state": "range"}}});
        let verdict = evaluate(json!({}), snapshot.clone());
        assert_eq!(verdict.reason_codes, vec!["range_state_block"]);

        let verdict = evaluate(json!({"allowRangeWhenTrendTag": true}), snapshot);
        assert!(verdict.allow);
    }

    #[test]
    fn test_only_first_reason_reported() {
        let verdict = evaluate(
            json!({}),
            json!({"tags": ["data_gap"], "historyContext": {"reg": {"state": "range"}, "vol": {"z": 9}}}),
        );
        assert_eq!(verdict.reason_codes, vec!["blocked_tag_match"]);
    }
}
