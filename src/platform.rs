// SPDX-License-Identifier: MIT

//! Production collaborators: local strategy runner, prompt catalog, AI gate
//! and model explainer behind the engine's collaborator traits

use async_trait::async_trait;
use std::sync::Arc;

use crate::ai::gate::provider_unavailable;
use crate::ai::{AiGatePolicy, ModelExplainer, ModelFactory, PromptCatalog};
use crate::composite::CompositeNode;
use crate::config::EngineConfig;
use crate::core::collaborators::{
    AiExplanation, AiGateContext, CompositeCollaborators, ExplanationContext, GatingDecision,
    LocalStrategyContext, LocalStrategyResult, PromptSettings, RefResolver,
};
use crate::core::error::{CompositeError, Result};
use crate::core::model::{create_model, Model};
use crate::strategies::{LocalStrategyRunner, StrategyRegistry};

pub struct PlatformCollaborators {
    runner: LocalStrategyRunner,
    prompts: PromptCatalog,
    gate: AiGatePolicy,
    explainer: Option<ModelExplainer>,
}

impl PlatformCollaborators {
    /// Build without an AI provider; every AI node is gated off
    pub fn new(config: &EngineConfig) -> Self {
        let runner = LocalStrategyRunner::new(StrategyRegistry::with_builtins())
            .with_instances(config.local_strategies.iter().cloned());
        Self {
            runner,
            prompts: PromptCatalog::new(config.prompts.iter().cloned()),
            gate: AiGatePolicy::new(config.gate.clone()),
            explainer: None,
        }
    }

    /// Build and try to connect the configured model.
    ///
    /// A provider that cannot be created (unsupported, missing API key) is
    /// logged and leaves the platform running without AI.
    pub fn from_config(config: &EngineConfig) -> Self {
        let platform = Self::new(config);
        let provider = config.model.provider.clone();
        match create_model(provider.as_deref(), config.model_name()) {
            Ok(model) => {
                // Templates naming their own model use the configured provider
                let factory: ModelFactory =
                    Arc::new(move |name: &str| create_model(provider.as_deref(), name));
                platform.with_explainer(ModelExplainer::with_factory(model, factory))
            }
            Err(e) => {
                log::warn!("AI explanations disabled: {}", e);
                platform
            }
        }
    }

    pub fn with_model(self, model: Arc<dyn Model>) -> Self {
        self.with_explainer(ModelExplainer::new(model))
    }

    pub fn with_explainer(mut self, explainer: ModelExplainer) -> Self {
        self.explainer = Some(explainer);
        self
    }

    pub fn runner(&self) -> &LocalStrategyRunner {
        &self.runner
    }

    pub fn ai_enabled(&self) -> bool {
        self.explainer.is_some()
    }
}

#[async_trait]
impl RefResolver for PlatformCollaborators {
    async fn resolve_ref(&self, node: &CompositeNode) -> Result<bool> {
        Ok(match node {
            CompositeNode::Local { ref_id, .. } => self.runner.contains(ref_id).await,
            CompositeNode::Ai { ref_id, .. } => self.prompts.contains(ref_id),
        })
    }
}

#[async_trait]
impl CompositeCollaborators for PlatformCollaborators {
    fn ref_resolver(&self) -> Option<&dyn RefResolver> {
        Some(self)
    }

    async fn run_local_strategy(
        &self,
        ref_id: &str,
        ctx: LocalStrategyContext,
    ) -> Result<LocalStrategyResult> {
        self.runner.run(ref_id, ctx).await
    }

    fn should_invoke_ai_explain(&self, ctx: &AiGateContext) -> GatingDecision {
        if self.explainer.is_none() {
            return provider_unavailable(ctx);
        }
        self.gate.decide(ctx)
    }

    async fn get_runtime_prompt_settings(&self, template_id: &str) -> Result<PromptSettings> {
        self.prompts.settings(template_id)
    }

    async fn generate_prediction_explanation(
        &self,
        ctx: ExplanationContext,
    ) -> Result<AiExplanation> {
        let explainer = self
            .explainer
            .as_ref()
            .ok_or_else(|| CompositeError::config("No AI provider configured"))?;
        let composite_id = ctx.composite_id.clone();
        let node_id = ctx.node_id.clone();
        let decision_hash = ctx.gate.decision_hash.clone();

        let explanation = explainer.explain(ctx).await?;
        self.gate.commit(&composite_id, &node_id, &decision_hash);
        Ok(explanation)
    }
}
