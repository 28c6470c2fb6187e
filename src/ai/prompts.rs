// SPDX-License-Identifier: MIT

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::collaborators::PromptSettings;
use crate::core::error::{CompositeError, Result};

pub const DEFAULT_INSTRUCTIONS: &str = "You are a market analyst. Given the current prediction and \
feature snapshot, explain the most likely short-term direction. Respond with a JSON object with \
keys: explanation (string), tags (array of strings), keyDrivers (array of strings), aiPrediction \
(object with signal up/down/neutral, confidence 0-1, expectedMovePct), disclaimer (string).";

/// A stored prompt template that `ai` nodes reference by `id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTemplate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_output_tokens: Option<u32>,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            instructions: None,
            model_name: None,
            temperature: None,
            max_output_tokens: None,
        }
    }

    fn settings(&self) -> PromptSettings {
        PromptSettings {
            template_id: self.id.clone(),
            name: if self.name.is_empty() {
                self.id.clone()
            } else {
                self.name.clone()
            },
            instructions: self
                .instructions
                .clone()
                .filter(|i| !i.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_INSTRUCTIONS.to_string()),
            model_name: self.model_name.clone(),
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// Prompt templates keyed by id
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    templates: HashMap<String, PromptTemplate>,
}

impl PromptCatalog {
    pub fn new(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.id.clone(), t)).collect(),
        }
    }

    pub fn contains(&self, template_id: &str) -> bool {
        self.templates.contains_key(template_id)
    }

    pub fn settings(&self, template_id: &str) -> Result<PromptSettings> {
        self.templates
            .get(template_id)
            .map(PromptTemplate::settings)
            .ok_or_else(|| CompositeError::PromptNotFound(template_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
