use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{lock, same_page, HandlerDeps, StateHandler};
use crate::types::{
    ActionDecision, ActionType, AgentContext, ExplorationState, Rejection, UrlCategory,
};

pub struct ValidatingDecisionHandler;

#[async_trait]
impl StateHandler for ValidatingDecisionHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::ValidatingDecision
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        let decision = ctx
            .current_decision
            .clone()
            .ok_or_else(|| anyhow!("no decision to validate"))?;

        if let Some(exit) = page_exit_override(ctx, deps) {
            log::info!("[{}] {}", ctx.agent_id, exit.reasoning);
            ctx.current_decision = Some(exit);
            return Ok(ExplorationState::ExecutingAction);
        }

        if decision.has_empty_value() {
            if !ctx.has_rejected(Rejection::EmptyValue) {
                log::warn!(
                    "[{}] rejecting {} with an empty value",
                    ctx.agent_id,
                    decision.action.as_str()
                );
                ctx.rejections.push(Rejection::EmptyValue);
                ctx.objective_amendment = Some(format!(
                    "Your previous '{}' decision had an empty value. Provide a concrete, non-empty value \
                     (a URL, text to type or an option to pick) or choose a different action.",
                    decision.action.as_str()
                ));
                return Ok(ExplorationState::GettingLlmDecision);
            }
            log::warn!(
                "[{}] oracle repeated an empty {} value, executing anyway",
                ctx.agent_id,
                decision.action.as_str()
            );
        }

        if decision.action == ActionType::Tool {
            let tool = decision.tool_name.as_deref().unwrap_or("");
            if ctx.page_progress.tools_used.contains(tool) {
                if !ctx.has_rejected(Rejection::RepeatedTool) {
                    log::warn!(
                        "[{}] tool {} already ran on {}",
                        ctx.agent_id,
                        tool,
                        ctx.page_progress.url
                    );
                    ctx.rejections.push(Rejection::RepeatedTool);
                    ctx.tools_disabled = true;
                    ctx.objective_amendment = Some(format!(
                        "The '{}' tool was already run on this page. Choose a browser action instead.",
                        tool
                    ));
                    return Ok(ExplorationState::GettingLlmDecision);
                }
                log::warn!("[{}] oracle insisted on tool {}", ctx.agent_id, tool);
            }
        }

        let detection = lock(&deps.loop_detector).detect_loop(&decision);
        if detection.is_loop {
            if !ctx.has_rejected(Rejection::ActionLoop) {
                log::warn!(
                    "[{}] loop detected: '{}' repeated {} times",
                    ctx.agent_id,
                    detection.pattern,
                    detection.count
                );
                ctx.rejections.push(Rejection::ActionLoop);
                lock(&deps.loop_detector).reset_action_history();
                ctx.objective_amendment = Some(format!(
                    "You have already done '{}' {} times without progress. Try something different.",
                    decision.describe(),
                    detection.count
                ));
                return Ok(ExplorationState::GettingLlmDecision);
            }
            log::warn!("[{}] loop persists after re-query, executing anyway", ctx.agent_id);
        }

        Ok(ExplorationState::ExecutingAction)
    }
}

// After enough work on one page, swap the decision for a move to the best unvisited page.
fn page_exit_override(ctx: &mut AgentContext, deps: &HandlerDeps) -> Option<ActionDecision> {
    let criteria = &deps.config.page_exit;
    let progress = &ctx.page_progress;
    if progress.actions <= criteria.min_steps_before_exit {
        return None;
    }

    let reason = if progress.actions >= criteria.max_actions_per_page {
        format!("{} actions", progress.actions)
    } else if progress.bugs >= criteria.max_bugs_per_page {
        format!("{} bugs", progress.bugs)
    } else if progress.elapsed_secs() >= criteria.max_time_per_page_secs {
        format!("{}s on page", progress.elapsed_secs())
    } else {
        return None;
    };

    let target = lock(&deps.url_discovery)
        .get_unvisited_urls()
        .into_iter()
        .filter(|u| u.category != UrlCategory::Admin)
        .filter(|u| !ctx.visited_urls.contains(&u.normalized_url))
        .filter(|u| !ctx.exit_targets_tried.contains(&u.normalized_url))
        .filter(|u| !same_page(&u.normalized_url, &progress.url))
        .min_by_key(|u| (u.category.exit_rank(), u.priority_score, u.sequence))?;

    // discovery marks it visited only once the page actually loads
    ctx.exit_targets_tried.insert(target.normalized_url.clone());
    let progress = &ctx.page_progress;

    Some(
        ActionDecision::navigate(
            target.normalized_url.clone(),
            format!(
                "page exit criteria met on {} ({}); moving to {} page {}",
                progress.url,
                reason,
                target.category.as_str(),
                target.normalized_url
            ),
        )
        .with_confidence(1.0),
    )
}
