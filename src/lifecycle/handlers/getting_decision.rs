use anyhow::Result;
use async_trait::async_trait;

use super::{build_request, HandlerDeps, StateHandler};
use crate::engine::retry::with_retry;
use crate::types::context::CheckpointOrigin;
use crate::types::{
    ActionDecision, ActionType, AgentContext, ExplorationState, PendingCheckpoint, StoppedReason,
};

pub struct GettingDecisionHandler;

#[async_trait]
impl StateHandler for GettingDecisionHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::GettingLlmDecision
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        if let Some(approved) = ctx.approved_decision.take() {
            log::debug!("[{}] using approved decision: {}", ctx.agent_id, approved.describe());
            ctx.original_decision = Some(approved.clone());
            ctx.current_decision = Some(approved);
            return Ok(ExplorationState::ValidatingDecision);
        }

        let request = build_request(ctx, deps);
        let response = with_retry(&deps.config.retry, "decision request", || {
            deps.oracle.decide_next_action(&request)
        })
        .await?;
        ctx.add_usage(&response.usage);

        let decision = response.decision;
        log::debug!(
            "[{}] oracle chose {} (confidence {:.2}): {}",
            ctx.agent_id,
            decision.describe(),
            decision.confidence,
            decision.reasoning
        );

        if decision.action == ActionType::Done {
            log::info!("[{}] oracle finished: {}", ctx.agent_id, decision.reasoning);
            ctx.current_decision = Some(decision);
            ctx.finish(StoppedReason::Completed);
            return Ok(ExplorationState::Done);
        }

        if let Some(reason) = checkpoint_reason(ctx, deps, &decision) {
            ctx.last_checkpoint_step = Some(ctx.step_number);
            ctx.checkpoint = Some(PendingCheckpoint {
                reason,
                origin: CheckpointOrigin::Decision,
                proposed: Some(decision),
            });
            return Ok(ExplorationState::WaitingCheckpoint);
        }

        ctx.original_decision = Some(decision.clone());
        ctx.current_decision = Some(decision);
        Ok(ExplorationState::ValidatingDecision)
    }
}

fn checkpoint_reason(
    ctx: &AgentContext,
    deps: &HandlerDeps,
    decision: &ActionDecision,
) -> Option<String> {
    // guidance for this step is already in hand; asking again would never advance
    if deps.checkpoint.is_none()
        || !ctx.rejections.is_empty()
        || ctx.last_checkpoint_step == Some(ctx.step_number)
    {
        return None;
    }

    let interval = deps.config.checkpoint_interval;
    if interval > 0 && ctx.step_number > 0 && ctx.step_number % interval == 0 {
        return Some(format!("periodic checkpoint after {} steps", ctx.step_number));
    }
    if decision.confidence < deps.config.confidence_threshold {
        return Some(format!(
            "low confidence ({:.2}) for {}",
            decision.confidence,
            decision.describe()
        ));
    }
    None
}
