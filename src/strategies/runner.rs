// SPDX-License-Identifier: MIT

//! Strategy instances and the runner that evaluates them for `local` nodes

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use super::{clamp_score, merge_config, StrategyInput, StrategyRegistry};
use crate::core::collaborators::{LocalStrategyContext, LocalStrategyResult};
use crate::core::digest::hash_json;
use crate::core::error::{CompositeError, Result};

pub const STRATEGY_DISABLED: &str = "strategy_disabled";

/// A configured strategy that graph nodes reference by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyInstance {
    pub id: String,
    pub strategy_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default = "empty_object")]
    pub config: Value,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn empty_object() -> Value {
    json!({})
}

fn enabled_by_default() -> bool {
    true
}

impl StrategyInstance {
    pub fn new(id: impl Into<String>, strategy_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            strategy_type: strategy_type.into(),
            name: String::new(),
            version: None,
            config: empty_object(),
            enabled: true,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Resolves `refId`s to strategy instances and evaluates them.
///
/// A `refId` naming a registered strategy type directly (with no stored
/// instance) runs that type with only its defaults and the node config.
#[derive(Clone)]
pub struct LocalStrategyRunner {
    registry: StrategyRegistry,
    instances: HashMap<String, StrategyInstance>,
}

impl LocalStrategyRunner {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self {
            registry,
            instances: HashMap::new(),
        }
    }

    pub fn with_instances(mut self, instances: impl IntoIterator<Item = StrategyInstance>) -> Self {
        for instance in instances {
            self.add_instance(instance);
        }
        self
    }

    pub fn add_instance(&mut self, instance: StrategyInstance) {
        if self.instances.contains_key(&instance.id) {
            log::warn!("Replacing strategy instance {}", instance.id);
        }
        self.instances.insert(instance.id.clone(), instance);
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn instances(&self) -> impl Iterator<Item = &StrategyInstance> {
        self.instances.values()
    }

    /// Whether `ref_id` names an instance or a registered strategy type
    pub async fn contains(&self, ref_id: &str) -> bool {
        match self.instances.get(ref_id) {
            Some(instance) => self.registry.get(&instance.strategy_type).await.is_some(),
            None => self.registry.get(ref_id).await.is_some(),
        }
    }

    pub async fn run(&self, ref_id: &str, ctx: LocalStrategyContext) -> Result<LocalStrategyResult> {
        let instance = match self.instances.get(ref_id) {
            Some(instance) => instance.clone(),
            None => StrategyInstance::new(ref_id, ref_id),
        };
        let strategy = self
            .registry
            .get(&instance.strategy_type)
            .await
            .ok_or_else(|| CompositeError::StrategyNotFound(ref_id.to_string()))?;

        if !ctx.config.is_object() {
            return Err(CompositeError::strategy(ref_id, "node config must be an object"));
        }

        let config = merge_config(&strategy.default_config(), &[&instance.config, &ctx.config]);
        let config_hash = hash_json(&Value::Object(config.clone()));
        let snapshot_hash = hash_json(&ctx.feature_snapshot);
        let version = instance
            .version
            .clone()
            .unwrap_or_else(|| strategy.version().to_string());
        let name = if instance.name.trim().is_empty() {
            strategy.name().to_string()
        } else {
            instance.name.clone()
        };

        let mut result = LocalStrategyResult {
            strategy_id: instance.id.clone(),
            strategy_type: strategy.strategy_type().to_string(),
            strategy_name: name,
            version: version.clone(),
            is_enabled: instance.enabled,
            config_hash,
            snapshot_hash,
            ..Default::default()
        };

        if !instance.enabled {
            log::debug!("Strategy instance {} disabled, passing through", instance.id);
            result.allow = true;
            result.reason_codes = vec![STRATEGY_DISABLED.to_string()];
            result.explanation = "Strategy instance is disabled.".to_string();
            result.meta = json!({"engine": "composite-rs"});
            return Ok(result);
        }

        let verdict = strategy.evaluate(&StrategyInput {
            config: &config,
            feature_snapshot: &ctx.feature_snapshot,
            signal: ctx.current_prediction.signal,
        });
        log::debug!(
            "Strategy {} ({}) allow={} score={:.1} reasons={:?}",
            instance.id,
            result.strategy_type,
            verdict.allow,
            verdict.score,
            verdict.reason_codes
        );

        let mut meta = match verdict.meta {
            Value::Object(map) => map,
            _ => Default::default(),
        };
        meta.insert("engine".to_string(), json!("composite-rs"));
        meta.insert("strategyType".to_string(), json!(result.strategy_type));
        meta.insert("strategyVersion".to_string(), json!(version));

        result.allow = verdict.allow;
        result.score = clamp_score(verdict.score);
        result.reason_codes = verdict.reason_codes;
        result.tags = verdict.tags;
        result.explanation = verdict.explanation;
        result.meta = Value::Object(meta);
        Ok(result)
    }
}
