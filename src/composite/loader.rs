//! Request loader - JSON/YAML file loading and parsing
//!
//! Composite definitions are stored either as run requests or as bare graph
//! documents; both are accepted in `.json`, `.yaml` and `.yml` files.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fs;
use std::path::Path;

use super::types::CompositeRunRequest;
use crate::core::error::{CompositeError, Result};

/// Loads composite run requests and graph documents from disk
pub struct RequestLoader;

impl RequestLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a run request from a JSON or YAML file
    pub fn load_request<P: AsRef<Path>>(&self, path: P) -> Result<CompositeRunRequest> {
        Self::load(path.as_ref())
    }

    /// Load a raw graph document (any JSON-compatible shape)
    pub fn load_graph<P: AsRef<Path>>(&self, path: P) -> Result<Value> {
        Self::load(path.as_ref())
    }

    fn load<T: DeserializeOwned>(path: &Path) -> Result<T> {
        let content = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content),
            Some("yaml") | Some("yml") => Self::parse_yaml(&content),
            other => Err(CompositeError::config(format!(
                "Unsupported file extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    pub fn parse_json<T: DeserializeOwned>(content: &str) -> Result<T> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn parse_yaml<T: DeserializeOwned>(content: &str) -> Result<T> {
        Ok(serde_yaml::from_str(content)?)
    }
}

impl Default for RequestLoader {
    fn default() -> Self {
        Self::new()
    }
}
