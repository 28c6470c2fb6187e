// SPDX-License-Identifier: MIT

//! AI collaborators: gating policy, prompt templates and the explainer

pub mod explainer;
pub mod gate;
pub mod prompts;

pub use explainer::{ModelExplainer, ModelFactory};
pub use gate::{AiGatePolicy, GateConfig};
pub use prompts::{PromptCatalog, PromptTemplate};
