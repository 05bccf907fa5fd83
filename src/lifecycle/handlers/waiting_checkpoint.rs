use anyhow::Result;
use async_trait::async_trait;

use super::{finish_iteration, HandlerDeps, StateHandler};
use crate::events::DomainEvent;
use crate::providers::{CheckpointAction, CheckpointResponse};
use crate::types::context::CheckpointOrigin;
use crate::types::{AgentContext, ExplorationState, SessionStatus, StoppedReason};

pub struct WaitingCheckpointHandler;

#[async_trait]
impl StateHandler for WaitingCheckpointHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::WaitingCheckpoint
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        let Some(pending) = ctx.checkpoint.take() else {
            log::warn!("[{}] checkpoint state entered with nothing pending", ctx.agent_id);
            return Ok(finish_iteration(ctx));
        };

        let response = match &deps.checkpoint {
            Some(handler) => {
                log::info!("[{}] checkpoint: {}", ctx.agent_id, pending.reason);
                deps.events.publish(DomainEvent::CheckpointTriggered {
                    session_id: ctx.session.id,
                    reason: pending.reason.clone(),
                });
                handler
                    .on_checkpoint(&ctx.session, &pending.reason, pending.proposed.as_ref())
                    .await?
            }
            None => CheckpointResponse::proceed(),
        };

        deps.events.publish(DomainEvent::GuidanceReceived {
            session_id: ctx.session.id,
            action: response.action,
            guidance: response.guidance.clone(),
        });

        match response.action {
            CheckpointAction::Stop => {
                log::info!("[{}] stopped at checkpoint", ctx.agent_id);
                ctx.session.status = SessionStatus::Stopped;
                ctx.finish(StoppedReason::StoppedByUser);
                Ok(ExplorationState::Done)
            }
            CheckpointAction::Continue => match pending.origin {
                CheckpointOrigin::Decision => {
                    ctx.approved_decision = pending.proposed;
                    Ok(ExplorationState::GettingLlmDecision)
                }
                CheckpointOrigin::Findings => Ok(finish_iteration(ctx)),
            },
            CheckpointAction::Redirect => {
                if let Some(guidance) = response.guidance.filter(|g| !g.trim().is_empty()) {
                    log::info!("[{}] redirected: {}", ctx.agent_id, guidance);
                    ctx.guidance = Some(guidance);
                }
                match pending.origin {
                    CheckpointOrigin::Decision => {
                        ctx.current_decision = None;
                        ctx.approved_decision = None;
                        Ok(ExplorationState::GettingLlmDecision)
                    }
                    CheckpointOrigin::Findings => Ok(finish_iteration(ctx)),
                }
            }
        }
    }
}
