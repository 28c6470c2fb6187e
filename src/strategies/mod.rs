// SPDX-License-Identifier: MIT

//! Local strategies - deterministic filters run by `local` graph nodes
//!
//! A strategy is a pure function of its merged config, the feature snapshot
//! and the current signal. Instances (a strategy type plus stored config)
//! are what graph nodes reference through their `refId`.

pub mod regime_gate;
pub mod registry;
pub mod runner;
pub mod signal_filter;

pub use registry::{StrategyInfo, StrategyRegistry};
pub use runner::{LocalStrategyRunner, StrategyInstance};

use serde_json::{Map, Value};

use crate::composite::state::Signal;

/// Everything a strategy may look at
#[derive(Debug, Clone, Copy)]
pub struct StrategyInput<'a> {
    /// Defaults overlaid with instance and node config
    pub config: &'a Map<String, Value>,
    pub feature_snapshot: &'a Value,
    pub signal: Signal,
}

/// Verdict of a single evaluation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StrategyVerdict {
    pub allow: bool,
    pub score: f64,
    pub reason_codes: Vec<String>,
    pub tags: Vec<String>,
    pub explanation: String,
    pub meta: Value,
}

pub trait LocalStrategy: Send + Sync {
    /// Registry key, e.g. `signal_filter`
    fn strategy_type(&self) -> &str;
    fn name(&self) -> &str;
    fn version(&self) -> &str;
    /// Config applied underneath instance and node config
    fn default_config(&self) -> Value;
    fn evaluate(&self, input: &StrategyInput<'_>) -> StrategyVerdict;
}

/// Shallow-merge `layers` over `defaults`; non-object layers are ignored
pub(crate) fn merge_config(defaults: &Value, layers: &[&Value]) -> Map<String, Value> {
    let mut merged = defaults.as_object().cloned().unwrap_or_default();
    for layer in layers {
        if let Some(map) = layer.as_object() {
            for (k, v) in map {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    merged
}

/// Walk nested objects of the snapshot, e.g. `["historyContext", "reg"]`
pub(crate) fn section<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |value, key| value.get(*key))
        .filter(|v| v.is_object())
}

/// Finite number from a JSON number or numeric string
pub(crate) fn finite_f64(value: Option<&Value>) -> Option<f64> {
    let parsed = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// Trimmed string list, skipping non-string entries
pub(crate) fn string_list(value: Option<&Value>, lowercase: bool) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| {
                    let s = s.trim();
                    if lowercase {
                        s.to_lowercase()
                    } else {
                        s.to_string()
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Label field (regime state, EMA stack); blank or missing is `unknown`
pub(crate) fn label(value: Option<&Value>) -> String {
    let text = match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(Value::Bool(true)) => "True".to_string(),
        _ => String::new(),
    };
    if text.is_empty() {
        "unknown".to_string()
    } else {
        text
    }
}

/// Loose truthiness for config flags
pub(crate) fn flag(value: Option<&Value>, default: bool) -> bool {
    match value {
        None => default,
        Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Clamp a score to 0-100; non-finite scores become 0
pub(crate) fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_config_layers() {
        let merged = merge_config(
            &json!({"a": 1, "b": 2}),
            &[&json!({"b": 3}), &json!("ignored"), &json!({"c": 4})],
        );
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_finite_f64() {
        assert_eq!(finite_f64(Some(&json!(1.5))), Some(1.5));
        assert_eq!(finite_f64(Some(&json!(" 2 "))), Some(2.0));
        assert_eq!(finite_f64(Some(&json!("NaN"))), None);
        assert_eq!(finite_f64(Some(&json!("abc"))), None);
        assert_eq!(finite_f64(Some(&json!(null))), None);
        assert_eq!(finite_f64(None), None);
    }

    #[test]
    fn test_section_and_label() {
        let snapshot = json!({"historyContext": {"reg": {"state": " trend_up "}, "vol": 3}});
        let reg = section(&snapshot, &["historyContext", "reg"]);
        assert_eq!(label(reg.and_then(|r| r.get("state"))), "trend_up");
        assert!(section(&snapshot, &["historyContext", "vol"]).is_none());
        assert_eq!(label(None), "unknown");
        assert_eq!(label(Some(&json!("  "))), "unknown");
    }

    #[test]
    fn test_flag() {
        assert!(flag(None, true));
        assert!(!flag(Some(&json!(null)), true));
        assert!(flag(Some(&json!(1)), false));
        assert!(!flag(Some(&json!("")), true));
    }
}
