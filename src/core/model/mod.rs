// SPDX-License-Identifier: MIT

//! Model module - LLM model trait used by AI strategy nodes
//!
//! Implementations live in their own submodules:
//! - [openai] - OpenAI-compatible chat completions API

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::sync::Arc;

use crate::core::error::{ModelError, Result};

/// Configuration for model generation
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GenerationConfig {
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Ask the provider for a JSON object response
    #[serde(default)]
    pub json_output: bool,
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    pub role: String,
    pub text: String,
}

impl Content {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            text: text.into(),
        }
    }
}

/// Core trait for LLM model implementations
#[async_trait]
pub trait Model: Send + Sync {
    /// Provider name used in logs and errors
    fn provider(&self) -> &str;

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content>;
}

/// Build a model for `provider`, inferring it from the model name when absent
pub fn create_model(provider: Option<&str>, model_name: &str) -> Result<Arc<dyn Model>> {
    let provider = provider
        .map(str::to_string)
        .or_else(|| env::var("MODEL_PROVIDER").ok())
        .unwrap_or_else(|| {
            if model_name.starts_with("gpt") {
                "OpenAI".to_string()
            } else {
                "unknown".to_string()
            }
        });

    log::info!("Using provider: {} with model: {}", provider, model_name);

    match provider.to_ascii_lowercase().as_str() {
        "openai" => Ok(Arc::new(openai::OpenAIModel::new(model_name.to_string())?)),
        other => Err(ModelError::UnsupportedProvider(other.to_string()).into()),
    }
}
