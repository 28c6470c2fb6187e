// SPDX-License-Identifier: MIT

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::regime_gate::RegimeGate;
use super::signal_filter::SignalFilter;
use super::LocalStrategy;
use crate::core::error::{CompositeError, Result};

/// Public description of a registered strategy type
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInfo {
    #[serde(rename = "type")]
    pub strategy_type: String,
    pub name: String,
    pub version: String,
    pub default_config: Value,
}

#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Arc<RwLock<HashMap<String, Arc<dyn LocalStrategy>>>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            strategies: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry preloaded with `signal_filter` and `regime_gate`
    pub fn with_builtins() -> Self {
        let builtins: [Arc<dyn LocalStrategy>; 2] = [Arc::new(SignalFilter), Arc::new(RegimeGate)];
        let map: HashMap<String, Arc<dyn LocalStrategy>> = builtins
            .into_iter()
            .map(|s| (s.strategy_type().to_string(), s))
            .collect();
        Self {
            strategies: Arc::new(RwLock::new(map)),
        }
    }

    /// Register a strategy type; types are unique
    pub async fn register(&self, strategy: Arc<dyn LocalStrategy>) -> Result<()> {
        let key = strategy.strategy_type().trim().to_string();
        if key.is_empty() {
            return Err(CompositeError::other("strategy_type_required"));
        }
        let mut strategies = self.strategies.write().await;
        if strategies.contains_key(&key) {
            return Err(CompositeError::other(format!(
                "strategy_already_registered:{}",
                key
            )));
        }
        log::debug!("Registered local strategy {}", key);
        strategies.insert(key, strategy);
        Ok(())
    }

    pub async fn get(&self, strategy_type: &str) -> Option<Arc<dyn LocalStrategy>> {
        let strategies = self.strategies.read().await;
        strategies.get(strategy_type.trim()).cloned()
    }

    /// Registered types, sorted by type
    pub async fn list(&self) -> Vec<StrategyInfo> {
        let strategies = self.strategies.read().await;
        let mut items: Vec<StrategyInfo> = strategies
            .values()
            .map(|s| StrategyInfo {
                strategy_type: s.strategy_type().to_string(),
                name: s.name().to_string(),
                version: s.version().to_string(),
                default_config: s.default_config(),
            })
            .collect();
        items.sort_by(|a, b| a.strategy_type.cmp(&b.strategy_type));
        items
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
