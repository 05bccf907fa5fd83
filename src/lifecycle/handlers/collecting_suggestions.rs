use anyhow::Result;
use async_trait::async_trait;

use super::{HandlerDeps, StateHandler};
use crate::error::ExplorationError;
use crate::providers::persona::collect_suggestions;
use crate::types::{AgentContext, ExplorationState};

pub struct CollectingSuggestionsHandler;

#[async_trait]
impl StateHandler for CollectingSuggestionsHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::CollectingSuggestions
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        if !deps.config.enable_personas || deps.personas.is_empty() {
            ctx.persona_suggestions.clear();
            return Ok(ExplorationState::GettingLlmDecision);
        }

        let page = ctx
            .current_page
            .as_ref()
            .ok_or_else(|| ExplorationError::PageExtraction("no page snapshot".to_string()))?;
        ctx.persona_suggestions =
            collect_suggestions(&deps.personas, page, deps.config.max_persona_suggestions).await;

        Ok(ExplorationState::GettingLlmDecision)
    }
}
