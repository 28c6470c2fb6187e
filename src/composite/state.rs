// SPDX-License-Identifier: MIT

//! Decision state threaded through a pipeline run

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// Directional trading signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Up,
    Down,
    /// Unknown values deserialize as neutral
    #[default]
    #[serde(other)]
    Neutral,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Up => "up",
            Signal::Down => "down",
            Signal::Neutral => "neutral",
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, Signal::Neutral)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Prediction produced upstream of the composite engine
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BasePrediction {
    pub signal: Signal,
    pub confidence: f64,
    pub expected_move_pct: f64,
    pub symbol: Option<String>,
    pub market_type: Option<String>,
    pub timeframe: Option<String>,
    pub timestamp: Option<String>,
}

/// Mutable decision state owned by a single run
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DecisionState {
    pub signal: Signal,
    pub confidence: f64,
    pub expected_move_pct: f64,
    pub tags: BTreeSet<String>,
    pub reason_codes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_drivers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl DecisionState {
    /// Seed a state from the base prediction and the feature snapshot tags
    pub fn seed(base: &BasePrediction, feature_snapshot: &Value) -> Self {
        let mut state = Self {
            signal: base.signal,
            confidence: normalize_confidence(base.confidence),
            expected_move_pct: finite_or_zero(base.expected_move_pct),
            symbol: base.symbol.clone(),
            market_type: base.market_type.clone(),
            timeframe: base.timeframe.clone(),
            timestamp: base.timestamp.clone(),
            ..Default::default()
        };
        state.merge_tags(snapshot_tags(feature_snapshot));
        state
    }

    /// Neutral decision returned when a graph cannot be executed
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Union tags into the state, ignoring blanks
    pub fn merge_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for tag in tags {
            let tag = tag.as_ref().trim();
            if !tag.is_empty() {
                self.tags.insert(tag.to_string());
            }
        }
    }

    /// Append reason codes not already present, keeping first-seen order
    pub fn merge_reason_codes<I, S>(&mut self, codes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for code in codes {
            let code = code.as_ref().trim();
            if !code.is_empty() && !self.reason_codes.iter().any(|c| c == code) {
                self.reason_codes.push(code.to_string());
            }
        }
    }
}

/// Normalize a confidence to the 0-100 scale.
///
/// Values at or below 1 are fractions; non-finite values become 0.
pub fn normalize_confidence(value: f64) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let scaled = if value <= 1.0 { value * 100.0 } else { value };
    scaled.clamp(0.0, 100.0)
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Extract the string tags of a feature snapshot (`{"tags": [...]}`)
pub fn snapshot_tags(feature_snapshot: &Value) -> Vec<String> {
    feature_snapshot
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
