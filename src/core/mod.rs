// SPDX-License-Identifier: MIT

//! Core building blocks shared by the engine and its collaborators:
//! error types, collaborator traits and the LLM model abstraction.

pub mod collaborators;
pub mod digest;
pub mod error;
pub mod model;

pub use collaborators::{
    AiExplanation, AiGateContext, AiPrediction, CompositeCollaborators, ExplanationContext,
    GatingDecision, LocalStrategyContext, LocalStrategyResult, PromptSettings, RefResolver,
};
pub use error::{CompositeError, ModelError, Result};
