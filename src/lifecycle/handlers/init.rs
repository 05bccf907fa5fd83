use anyhow::Result;
use async_trait::async_trait;
use url::Url;

use super::{lock, HandlerDeps, StateHandler};
use crate::error::ExplorationError;
use crate::events::DomainEvent;
use crate::types::{AgentContext, ExplorationState};

pub struct InitHandler;

#[async_trait]
impl StateHandler for InitHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::Init
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        if ctx.session.max_steps == 0 {
            return Err(ExplorationError::config("session max_steps must be positive").into());
        }
        let target = ctx.session.target_url.clone();
        Url::parse(&target).map_err(|e| {
            ExplorationError::config(format!("invalid target url '{}': {}", target, e))
        })?;

        lock(&deps.url_discovery).set_base_url(&target)?;

        log::info!(
            "[{}] starting session {} at {} (max {} steps)",
            ctx.agent_id,
            ctx.session.id,
            target,
            ctx.session.max_steps
        );
        if let Err(e) = deps.sessions.save(&ctx.session).await {
            log::warn!("[{}] could not save session: {:#}", ctx.agent_id, e);
        }
        deps.events.publish(DomainEvent::SessionStarted {
            session_id: ctx.session.id,
            agent_id: ctx.agent_id.clone(),
            url: target,
        });

        Ok(ExplorationState::ExtractingPage)
    }
}
