use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

use super::handlers::{default_handlers, HandlerDeps, StateHandler};
use crate::error::ExplorationError;
use crate::types::{AgentContext, ExplorationState};

/// Drives an [`AgentContext`] from INIT to DONE or ERROR, one handler per state.
///
/// Handler failures are absorbed into the context as an ERROR transition. A
/// handler that names a state its own state may not reach is a programming
/// error and surfaces as [`ExplorationError::InvalidTransition`].
pub struct ExplorationStateMachine {
    deps: HandlerDeps,
    handlers: HashMap<ExplorationState, Arc<dyn StateHandler>>,
}

impl ExplorationStateMachine {
    pub fn new(deps: HandlerDeps) -> Self {
        let handlers = default_handlers()
            .into_iter()
            .map(|h| (h.state(), h))
            .collect();
        Self { deps, handlers }
    }

    pub fn with_handler(mut self, handler: Arc<dyn StateHandler>) -> Self {
        self.handlers.insert(handler.state(), handler);
        self
    }

    pub fn deps(&self) -> &HandlerDeps {
        &self.deps
    }

    pub async fn step(&self, mut ctx: AgentContext) -> Result<AgentContext> {
        let current = ctx.current_state;
        if current.is_terminal() {
            return Ok(ctx);
        }

        let handler = self.handlers.get(&current).ok_or_else(|| {
            ExplorationError::Unsupported(format!("no handler registered for {}", current))
        })?;

        let next = match handler.run(&mut ctx, &self.deps).await {
            Ok(next) => next,
            Err(e) => {
                log::error!("[{}] {} failed: {:#}", ctx.agent_id, current, e);
                ctx.fail(format!("{:#}", e));
                ExplorationState::Error
            }
        };

        if !current.can_transition_to(next) {
            return Err(ExplorationError::InvalidTransition {
                from: current,
                to: next,
            }
            .into());
        }

        log::debug!("[{}] {} -> {}", ctx.agent_id, current, next);
        ctx.current_state = next;
        Ok(ctx)
    }

    pub async fn run(&self, mut ctx: AgentContext) -> Result<AgentContext> {
        while !ctx.current_state.is_terminal() {
            ctx = self.step(ctx).await?;
            if ctx.should_exit && !ctx.current_state.is_terminal() {
                log::debug!(
                    "[{}] exit requested in {}",
                    ctx.agent_id,
                    ctx.current_state
                );
                break;
            }
        }
        Ok(ctx)
    }
}
