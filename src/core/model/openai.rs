// SPDX-License-Identifier: MIT

//! OpenAI Model - chat completions API implementation

use super::{Content, GenerationConfig, Model};
use crate::core::error::{ModelError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::env;

/// OpenAI-compatible chat model
pub struct OpenAIModel {
    client: Client,
    api_key: String,
    model_name: String,
    base_url: String,
}

impl OpenAIModel {
    /// Create a new OpenAIModel
    ///
    /// Requires `OPENAI_API_KEY` environment variable to be set.
    /// Optionally uses `OPENAI_BASE_URL` for custom endpoints.
    pub fn new(model_name: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .map_err(|_| ModelError::ApiKeyMissing("OpenAI".to_string()))?;
        let base_url =
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        Ok(Self {
            client: Client::new(),
            api_key,
            model_name,
            base_url,
        })
    }

    fn content_to_openai_message(content: &Content) -> Value {
        let role = match content.role.as_str() {
            "model" => "assistant",
            other => other,
        };
        json!({ "role": role, "content": content.text })
    }

    fn build_body(&self, history: &[Content], config: Option<&GenerationConfig>) -> Value {
        let messages: Vec<Value> = history
            .iter()
            .map(Self::content_to_openai_message)
            .collect();

        let mut body = json!({
            "model": self.model_name,
            "messages": messages
        });

        if let Some(cfg) = config {
            if let Some(temp) = cfg.temperature {
                body["temperature"] = json!(temp);
            }
            if let Some(max_tokens) = cfg.max_output_tokens {
                body["max_tokens"] = json!(max_tokens);
            }
            if cfg.json_output {
                body["response_format"] = json!({ "type": "json_object" });
            }
        }
        body
    }

    fn parse_openai_response(response: &Value) -> Result<Content> {
        let choice = response["choices"]
            .as_array()
            .and_then(|c| c.first())
            .ok_or_else(|| ModelError::InvalidResponse("No choices in OpenAI response".into()))?;

        let text = choice["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(Content {
            role: "model".to_string(),
            text,
        })
    }
}

#[async_trait]
impl Model for OpenAIModel {
    fn provider(&self) -> &str {
        "OpenAI"
    }

    async fn generate_content(
        &self,
        history: &[Content],
        config: Option<&GenerationConfig>,
    ) -> Result<Content> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(history, config);

        log::debug!(
            "OpenAI request body: {}",
            serde_json::to_string_pretty(&body).unwrap_or_default()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(ModelError::RateLimited { retry_after_secs }.into());
        }
        if !status.is_success() {
            let text = resp.text().await?;
            return Err(ModelError::api("OpenAI", text).into());
        }

        let resp_json: Value = resp.json().await?;
        log::debug!("OpenAI response: {}", resp_json);

        Self::parse_openai_response(&resp_json)
    }
}
