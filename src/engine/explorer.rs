use anyhow::Result;
use std::time::Instant;

use crate::events::DomainEvent;
use crate::lifecycle::handlers::lock;
use crate::lifecycle::{ExplorationStateMachine, HandlerDeps};
use crate::types::{
    create_context, AgentContext, AgentId, ExplorationResult, ExplorationSession,
    ExplorationState, StoppedReason,
};

pub struct ExplorationAgent {
    agent_id: AgentId,
    machine: ExplorationStateMachine,
}

impl ExplorationAgent {
    pub fn new(agent_id: impl Into<AgentId>, deps: HandlerDeps) -> Self {
        Self::with_machine(agent_id, ExplorationStateMachine::new(deps))
    }

    pub fn with_machine(agent_id: impl Into<AgentId>, machine: ExplorationStateMachine) -> Self {
        Self {
            agent_id: agent_id.into(),
            machine,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Explores from `url` until the oracle is done, the step budget runs out,
    /// a checkpoint stops the run, or something fails.
    ///
    /// Failures inside the loop end up in the result with `StoppedReason::Error`.
    /// Only an illegal state transition is returned as `Err`. The browser is
    /// closed exactly once either way.
    pub async fn explore(&self, url: &str, objective: &str, max_steps: u32) -> Result<ExplorationResult> {
        let started = Instant::now();
        let deps = self.machine.deps();
        lock(&deps.loop_detector).reset();

        let session = ExplorationSession::new(url, objective, max_steps);
        log::info!(
            "[{}] exploring {} (session {}, max {} steps)",
            self.agent_id,
            url,
            session.id,
            max_steps
        );
        let ctx = create_context(self.agent_id.clone(), session);

        let driven = self.drive(ctx).await;
        if let Err(e) = deps.browser.close().await {
            log::warn!("[{}] failed to close browser: {:#}", self.agent_id, e);
        }

        let ctx = driven?;
        Ok(self.finalize(ctx, started).await)
    }

    async fn drive(&self, mut ctx: AgentContext) -> Result<AgentContext> {
        let browser = &self.machine.deps().browser;

        if let Err(e) = browser.initialize().await {
            ctx.fail(format!("browser initialization failed: {:#}", e));
            ctx.current_state = ExplorationState::Error;
            return Ok(ctx);
        }

        let target = ctx.session.target_url.clone();
        match browser.navigate(&target).await {
            Ok(result) if result.success => {}
            Ok(result) => {
                ctx.fail(format!(
                    "initial navigation to {} failed: {}",
                    target,
                    result.error.unwrap_or_else(|| "unknown error".to_string())
                ));
                ctx.current_state = ExplorationState::Error;
                return Ok(ctx);
            }
            Err(e) => {
                ctx.fail(format!("initial navigation to {} failed: {:#}", target, e));
                ctx.current_state = ExplorationState::Error;
                return Ok(ctx);
            }
        }

        self.machine.run(ctx).await
    }

    async fn finalize(&self, mut ctx: AgentContext, started: Instant) -> ExplorationResult {
        let deps = self.machine.deps();

        let stopped_reason = match ctx.exit_reason {
            Some(reason) => reason,
            None if ctx.current_state == ExplorationState::Error => StoppedReason::Error,
            None => StoppedReason::Completed,
        };
        ctx.session.finish(stopped_reason);
        if let Err(e) = deps.sessions.save(&ctx.session).await {
            log::warn!("[{}] failed to persist final session: {:#}", self.agent_id, e);
        }

        let summary = self.summarize(&ctx).await;

        deps.events.publish(DomainEvent::SessionEnded {
            session_id: ctx.session.id,
            agent_id: self.agent_id.clone(),
            stopped_reason,
            total_steps: ctx.session.steps.len(),
            findings: ctx.findings.len(),
        });

        let discovered_urls = lock(&deps.url_discovery).all_urls();
        let mut visited_urls: Vec<String> = ctx.visited_urls.into_iter().collect();
        visited_urls.sort();

        log::info!(
            "[{}] finished {} ({}): {} steps, {} findings",
            self.agent_id,
            ctx.session.target_url,
            stopped_reason.as_str(),
            ctx.session.steps.len(),
            ctx.findings.len()
        );

        ExplorationResult {
            session_id: ctx.session.id,
            agent_id: self.agent_id.clone(),
            start_url: ctx.session.target_url.clone(),
            stopped_reason,
            total_steps: ctx.session.steps.len(),
            findings: ctx.findings,
            visited_urls,
            discovered_urls,
            token_usage: ctx.token_usage,
            summary,
            error: ctx.error,
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }

    async fn summarize(&self, ctx: &AgentContext) -> String {
        let history: Vec<String> = ctx
            .session
            .steps
            .iter()
            .map(|s| format!("{}. {} on {}", s.step_number, s.decision.describe(), s.url))
            .collect();
        let findings: Vec<String> = ctx.findings.iter().map(|f| f.summary_line()).collect();

        let mut summary = match self
            .machine
            .deps()
            .oracle
            .generate_summary(&history, &findings)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => fallback_summary(ctx),
            Err(e) => {
                log::warn!("[{}] summary generation failed: {:#}", self.agent_id, e);
                fallback_summary(ctx)
            }
        };

        if let Some(error) = &ctx.error {
            summary.push_str(&format!("\n\nExploration ended with an error: {}", error));
        }
        summary
    }
}

fn fallback_summary(ctx: &AgentContext) -> String {
    format!(
        "Explored {} in {} steps across {} pages and recorded {} findings.",
        ctx.session.target_url,
        ctx.session.steps.len(),
        ctx.visited_urls.len(),
        ctx.findings.len()
    )
}
