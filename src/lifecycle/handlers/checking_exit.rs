use anyhow::Result;
use async_trait::async_trait;

use super::{finish_iteration, HandlerDeps, StateHandler};
use crate::types::{AgentContext, ExplorationState};

pub struct CheckingExitHandler;

#[async_trait]
impl StateHandler for CheckingExitHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::CheckingExit
    }

    async fn run(&self, ctx: &mut AgentContext, _deps: &HandlerDeps) -> Result<ExplorationState> {
        Ok(finish_iteration(ctx))
    }
}
