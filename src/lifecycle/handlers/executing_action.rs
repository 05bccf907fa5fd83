use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::time::{Duration, Instant};

use super::{lock, HandlerDeps, StateHandler};
use crate::error::ExplorationError;
use crate::tools::ToolContext;
use crate::types::{ActionDecision, ActionResult, ActionType, AgentContext, ExplorationState};

const SCROLL_SCRIPT: &str = "window.scrollBy(0, window.innerHeight)";
const WAIT_DURATION: Duration = Duration::from_millis(500);

pub struct ExecutingActionHandler;

#[async_trait]
impl StateHandler for ExecutingActionHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::ExecutingAction
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        let decision = ctx
            .current_decision
            .clone()
            .ok_or_else(|| anyhow!("no decision to execute"))?;

        ctx.step_number += 1;
        ctx.page_progress.actions += 1;

        let result = perform(ctx, deps, &decision)
            .await
            .map_err(|e| ExplorationError::ActionExecution(format!("{}: {:#}", decision.describe(), e)))?;

        lock(&deps.loop_detector).record(&decision);
        ctx.record_action(decision.describe());

        if result.success {
            log::debug!(
                "[{}] step {}: {} ({}ms)",
                ctx.agent_id,
                ctx.step_number,
                decision.describe(),
                result.duration_ms
            );
        } else {
            log::warn!(
                "[{}] step {}: {} failed: {}",
                ctx.agent_id,
                ctx.step_number,
                decision.describe(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }

        let console = deps.browser.console_errors();
        if console.len() > ctx.known_console_errors {
            for message in &console[ctx.known_console_errors..] {
                ctx.pending_issues.push(format!("Console error: {}", message));
            }
        }
        ctx.known_console_errors = console.len();

        ctx.last_action_result = Some(result);
        Ok(ExplorationState::ProcessingFindings)
    }
}

// Runs one decision against the browser. Failed actions are results; only a broken browser is an `Err`.
async fn perform(
    ctx: &mut AgentContext,
    deps: &HandlerDeps,
    decision: &ActionDecision,
) -> Result<ActionResult> {
    let browser = deps.browser.as_ref();
    let selector = decision.selector.as_deref().unwrap_or("");
    let value = decision.value.as_deref().unwrap_or("");
    let started = Instant::now();

    if decision.action.requires_value() && value.trim().is_empty() {
        return Ok(ActionResult::failed(
            format!("{} requires a value", decision.action.as_str()),
            0,
        ));
    }
    if matches!(
        decision.action,
        ActionType::Click | ActionType::Fill | ActionType::Select | ActionType::Hover
    ) && selector.trim().is_empty()
    {
        return Ok(ActionResult::failed(
            format!("{} requires a selector", decision.action.as_str()),
            0,
        ));
    }

    match decision.action {
        ActionType::Navigate => browser.navigate(value).await,
        ActionType::Click => browser.click(selector).await,
        ActionType::Fill => browser.fill(selector, value).await,
        ActionType::Select => browser.select(selector, value).await,
        ActionType::Hover => browser.hover(selector).await,
        ActionType::Back => browser.go_back().await,
        ActionType::Refresh => browser.refresh().await,
        ActionType::Scroll => Ok(match browser.evaluate(SCROLL_SCRIPT).await {
            Ok(_) => ActionResult::ok(elapsed_ms(started)),
            Err(e) => ActionResult::failed(format!("scroll failed: {:#}", e), elapsed_ms(started)),
        }),
        ActionType::Wait => {
            tokio::time::sleep(WAIT_DURATION).await;
            Ok(ActionResult::ok(elapsed_ms(started)))
        }
        ActionType::Tool => Ok(run_tool(ctx, deps, decision, started).await),
        ActionType::Done => Ok(ActionResult::ok(0)),
    }
}

async fn run_tool(
    ctx: &mut AgentContext,
    deps: &HandlerDeps,
    decision: &ActionDecision,
    started: Instant,
) -> ActionResult {
    let name = decision.tool_name.clone().unwrap_or_default();
    let params = decision
        .tool_params
        .clone()
        .unwrap_or(serde_json::Value::Null);
    let page = ctx.current_page.clone().unwrap_or_default();
    let tool_context = ToolContext {
        page: &page,
        browser: deps.browser.as_ref(),
    };

    ctx.page_progress.tools_used.insert(name.clone());
    match deps.tools.execute(&name, params, &tool_context).await {
        Ok(output) => {
            log::debug!("[{}] tool {} returned {}", ctx.agent_id, name, output.output);
            ctx.pending_issues.extend(output.issues);
            ActionResult::ok(elapsed_ms(started))
        }
        Err(e) => ActionResult::failed(format!("tool {} failed: {:#}", name, e), elapsed_ms(started)),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
