// SPDX-License-Identifier: MIT

//! Typed error handling for composite-rs
//!
//! Validation problems are never errors: they are reported as string codes
//! inside `ValidationResult`. This type covers collaborator failures, which
//! the engine propagates to its caller untouched.

use thiserror::Error;

/// Top-level error type for composite-rs
#[derive(Debug, Error)]
pub enum CompositeError {
    /// A local strategy failed while evaluating
    #[error("Local strategy '{ref_id}' failed: {message}")]
    Strategy { ref_id: String, message: String },

    /// Local strategy reference is not registered
    #[error("strategy_not_found:{0}")]
    StrategyNotFound(String),

    /// Prompt template reference is not registered
    #[error("prompt_template_not_found:{0}")]
    PromptNotFound(String),

    /// AI explanation provider failure
    #[error("AI provider error: {0}")]
    Ai(#[from] ModelError),

    /// Combine mode accepted by the data model but not executable
    #[error("Unsupported combine mode: {0}")]
    UnsupportedCombineMode(String),

    /// Configuration errors (missing env vars, invalid config)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Provider not supported
    #[error("Model provider not supported: {0}")]
    UnsupportedProvider(String),

    /// Provider returned a non-success status
    #[error("API error from {provider}: {message}")]
    Api { provider: String, message: String },

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),
}

impl CompositeError {
    /// Create a local strategy failure
    pub fn strategy(ref_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Strategy {
            ref_id: ref_id.into(),
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl ModelError {
    /// Create a provider API error
    pub fn api(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<&str> for CompositeError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for CompositeError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, CompositeError>;
