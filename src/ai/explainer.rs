// SPDX-License-Identifier: MIT

//! Model-backed prediction explainer
//!
//! Sends the prompt template instructions plus the current decision state
//! to the model and parses the strict-JSON reply into an `AiExplanation`.

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::core::collaborators::{AiExplanation, ExplanationContext, PromptSettings};
use crate::core::error::{ModelError, Result};
use crate::core::model::{create_model, Content, GenerationConfig, Model};

/// Builds the model named by a prompt template
pub type ModelFactory = Arc<dyn Fn(&str) -> Result<Arc<dyn Model>> + Send + Sync>;

pub struct ModelExplainer {
    model: Arc<dyn Model>,
    factory: ModelFactory,
    /// Template models by name, built on first use
    template_models: Mutex<HashMap<String, Arc<dyn Model>>>,
}

impl ModelExplainer {
    /// Explainer whose template models are inferred from the model name
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self::with_factory(model, Arc::new(|name: &str| create_model(None, name)))
    }

    pub fn with_factory(model: Arc<dyn Model>, factory: ModelFactory) -> Self {
        Self {
            model,
            factory,
            template_models: Mutex::new(HashMap::new()),
        }
    }

    /// The template's own model when it names one, the default model otherwise
    fn model_for(&self, settings: &PromptSettings) -> Result<Arc<dyn Model>> {
        let name = match settings.model_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Ok(self.model.clone()),
        };
        let mut models = self
            .template_models
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(model) = models.get(name) {
            return Ok(model.clone());
        }
        log::debug!("Creating model {} for template {}", name, settings.template_id);
        let model = (self.factory)(name)?;
        models.insert(name.to_string(), model.clone());
        Ok(model)
    }

    pub async fn explain(&self, ctx: ExplanationContext) -> Result<AiExplanation> {
        let settings = &ctx.prompt_settings;
        let model = self.model_for(settings)?;
        log::info!(
            "Requesting explanation from {} with template {}",
            model.provider(),
            settings.template_id
        );

        let payload = json!({
            "prediction": ctx.prediction,
            "featureSnapshot": ctx.feature_snapshot,
            "gate": {
                "priority": ctx.gate.priority,
                "reasonCodes": ctx.gate.reason_codes,
            },
        });
        let history = vec![
            Content::system(settings.instructions.clone()),
            Content::user(serde_json::to_string_pretty(&payload)?),
        ];
        let config = GenerationConfig {
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
            json_output: true,
        };

        let reply = model.generate_content(&history, Some(&config)).await?;
        parse_explanation(&reply.text)
    }
}

/// Parse a model reply, tolerating code fences and text around the object
pub fn parse_explanation(text: &str) -> Result<AiExplanation> {
    let start = text.find('{');
    let end = text.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &text[s..=e],
        _ => {
            return Err(ModelError::InvalidResponse(format!(
                "Expected a JSON object, got: {}",
                text.chars().take(120).collect::<String>()
            ))
            .into())
        }
    };
    serde_json::from_str(body)
        .map_err(|e| ModelError::InvalidResponse(format!("Malformed explanation: {}", e)).into())
}
