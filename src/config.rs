// SPDX-License-Identifier: MIT

//! Engine configuration
//!
//! Loaded from a YAML (or JSON) file, then overridden by environment
//! variables:
//! - `COMPOSITE_MAX_AI_CALLS` - per-run AI call budget
//! - `MODEL_PROVIDER` / `MODEL_NAME` - explanation model
//!
//! Provider credentials (`OPENAI_API_KEY`, `OPENAI_BASE_URL`) are read by the
//! model implementation itself.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::ai::{GateConfig, PromptTemplate};
use crate::composite::RunOptions;
use crate::core::error::{CompositeError, Result};
use crate::strategies::StrategyInstance;

pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelConfig {
    pub provider: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub max_ai_calls_per_run: usize,
    pub model: ModelConfig,
    pub gate: GateConfig,
    pub prompts: Vec<PromptTemplate>,
    pub local_strategies: Vec<StrategyInstance>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_ai_calls_per_run: 1,
            model: ModelConfig::default(),
            gate: GateConfig::default(),
            prompts: vec![],
            local_strategies: vec![],
        }
    }
}

impl EngineConfig {
    /// Load from a file; YAML parsing also accepts JSON documents
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("COMPOSITE_MAX_AI_CALLS") {
            self.max_ai_calls_per_run = raw.trim().parse().map_err(|_| {
                CompositeError::config(format!("COMPOSITE_MAX_AI_CALLS must be an integer, got '{}'", raw))
            })?;
        }
        if let Some(provider) = lookup("MODEL_PROVIDER").filter(|p| !p.trim().is_empty()) {
            self.model.provider = Some(provider);
        }
        if let Some(name) = lookup("MODEL_NAME").filter(|n| !n.trim().is_empty()) {
            self.model.name = Some(name);
        }
        Ok(())
    }

    pub fn model_name(&self) -> &str {
        self.model.name.as_deref().unwrap_or(DEFAULT_MODEL_NAME)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            max_ai_calls_per_run: self.max_ai_calls_per_run,
        }
    }
}
