// SPDX-License-Identifier: MIT

//! Composite engine - owns the collaborators and exposes run/validate
//! entry points for the CLI and the HTTP server

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::executor::{execute, RunOptions};
use super::normalizer::normalize_composite_graph;
use super::types::{CompositeRunRequest, CompositeRunResult, NodeExecutionRecord, ValidationResult};
use super::validator::{validate_composite_graph, ValidateOptions};
use crate::core::collaborators::CompositeCollaborators;
use crate::core::error::Result;

/// Progress events emitted while a run executes
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    Validated(ValidationResult),
    NodeFinished(NodeExecutionRecord),
    Completed(Box<CompositeRunResult>),
    Error(String),
}

impl RunEvent {
    /// Event name used on the wire (SSE `event:` field)
    pub fn name(&self) -> &'static str {
        match self {
            RunEvent::Validated(_) => "validated",
            RunEvent::NodeFinished(_) => "node_finished",
            RunEvent::Completed(_) => "completed",
            RunEvent::Error(_) => "error",
        }
    }
}

/// Shared entry point around a set of collaborators
#[derive(Clone)]
pub struct CompositeEngine {
    deps: Arc<dyn CompositeCollaborators>,
    options: RunOptions,
}

impl CompositeEngine {
    pub fn new(deps: Arc<dyn CompositeCollaborators>) -> Self {
        Self {
            deps,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Normalize and validate a raw graph definition against the registries
    pub async fn validate(&self, raw: &Value) -> ValidationResult {
        let graph = normalize_composite_graph(raw);
        validate_composite_graph(
            &graph,
            ValidateOptions {
                resolver: self.deps.ref_resolver(),
            },
        )
        .await
    }

    pub async fn run(&self, request: &CompositeRunRequest) -> Result<CompositeRunResult> {
        execute(request, self.deps.as_ref(), self.options, None).await
    }

    /// Run while streaming progress to `tx`.
    ///
    /// The final event is always `Completed` or `Error`.
    pub async fn run_stream(
        &self,
        request: &CompositeRunRequest,
        tx: mpsc::Sender<RunEvent>,
    ) -> Result<CompositeRunResult> {
        match execute(request, self.deps.as_ref(), self.options, Some(&tx)).await {
            Ok(result) => {
                let _ = tx.send(RunEvent::Completed(Box::new(result.clone()))).await;
                Ok(result)
            }
            Err(e) => {
                let _ = tx.send(RunEvent::Error(e.to_string())).await;
                Err(e)
            }
        }
    }
}
