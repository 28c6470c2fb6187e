// SPDX-License-Identifier: MIT

//! Composite strategy graphs
//!
//! A composite strategy is a DAG of local (deterministic) and AI nodes. A run
//! goes through four stages:
//! - [normalizer] - coerce persisted definitions into canonical nodes/edges
//! - [validator] - cycle detection, reference checks, deterministic order
//! - [executor] - sequential pipeline over one decision state
//! - [merger] - collapse the execution log using the output policy

pub mod engine;
pub mod executor;
pub mod loader;
pub mod merger;
pub mod normalizer;
pub mod state;
pub mod types;
pub mod validator;

pub use engine::{CompositeEngine, RunEvent};
pub use executor::{run_composite_strategy, RunOptions};
pub use loader::RequestLoader;
pub use merger::{merge_composite_output, MergedDecision};
pub use normalizer::normalize_composite_graph;
pub use state::{BasePrediction, DecisionState, Signal};
pub use types::{
    AiNodeOutput, CombineMode, CompositeEdge, CompositeGraphDefinition, CompositeNode,
    CompositeRunRequest, CompositeRunResult, NodeExecutionRecord, NodeKind, NodeOutput,
    OutputPolicy, ValidationResult,
};
pub use validator::{validate_composite_graph, ValidateOptions};
