use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use super::{lock, HandlerDeps, StateHandler};
use crate::engine::bug_dedup::classify_severity;
use crate::events::DomainEvent;
use crate::types::context::CheckpointOrigin;
use crate::types::{
    AgentContext, ExplorationState, ExplorationStep, Finding, PendingCheckpoint,
};

pub struct ProcessingFindingsHandler;

#[async_trait]
impl StateHandler for ProcessingFindingsHandler {
    fn state(&self) -> ExplorationState {
        ExplorationState::ProcessingFindings
    }

    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState> {
        let issues = collect_issues(ctx);
        let page_url = ctx.current_page_url().to_string();
        let steps: Vec<String> = ctx.recent_actions.iter().cloned().collect();

        let fresh: Vec<Finding> = {
            let mut dedup = lock(&deps.bug_dedup);
            let mut fresh = Vec::new();
            for issue in issues {
                if let Some(original) = dedup.is_duplicate(&issue, &page_url) {
                    log::debug!(
                        "[{}] skipping duplicate of {}: {}",
                        ctx.agent_id,
                        original,
                        issue
                    );
                    continue;
                }
                let finding_type = dedup.extract_signature(&issue, &page_url).bug_type;
                let severity = classify_severity(finding_type, &issue);
                let finding = Finding::new(ctx.session.id, finding_type, severity, issue, &page_url)
                    .with_steps(steps.clone())
                    .at_step(ctx.step_number);
                dedup.register_bug(&finding);
                fresh.push(finding);
            }
            fresh
        };

        let mut severe = Vec::new();
        for finding in &fresh {
            log::info!("[{}] new finding {}", ctx.agent_id, finding.summary_line());
            if let Err(e) = deps.findings.save(finding).await {
                log::warn!("[{}] failed to persist finding {}: {:#}", ctx.agent_id, finding.id, e);
            }
            deps.events.publish(DomainEvent::FindingDiscovered {
                session_id: ctx.session.id,
                finding: finding.clone(),
            });
            if finding.severity.is_severe() {
                severe.push(finding.summary_line());
            }
        }
        ctx.page_progress.bugs += fresh.len() as u32;

        record_step(ctx, deps, &fresh, &page_url).await;
        ctx.findings.extend(fresh);

        if !severe.is_empty()
            && deps.config.checkpoint_on_critical_findings
            && deps.checkpoint.is_some()
        {
            ctx.checkpoint = Some(PendingCheckpoint {
                reason: format!("severe findings: {}", severe.join("; ")),
                origin: CheckpointOrigin::Findings,
                proposed: None,
            });
            return Ok(ExplorationState::WaitingCheckpoint);
        }

        Ok(ExplorationState::CheckingExit)
    }
}

// Issues the oracle reported plus those the step itself surfaced, without repeats.
fn collect_issues(ctx: &mut AgentContext) -> Vec<String> {
    let observed = ctx
        .current_decision
        .as_ref()
        .map(|d| d.observed_issues.clone())
        .unwrap_or_default();

    let mut issues: Vec<String> = Vec::new();
    for issue in observed.into_iter().chain(ctx.pending_issues.drain(..)) {
        let issue = issue.trim().to_string();
        if !issue.is_empty() && !issues.contains(&issue) {
            issues.push(issue);
        }
    }
    issues
}

async fn record_step(ctx: &mut AgentContext, deps: &HandlerDeps, fresh: &[Finding], page_url: &str) {
    let (Some(decision), Some(result)) = (ctx.current_decision.clone(), ctx.last_action_result.clone())
    else {
        return;
    };

    deps.events.publish(DomainEvent::StepCompleted {
        session_id: ctx.session.id,
        step_number: ctx.step_number,
        action: decision.describe(),
        url: page_url.to_string(),
        success: result.success,
    });

    ctx.session.steps.push(ExplorationStep {
        step_number: ctx.step_number,
        url: page_url.to_string(),
        decision,
        result,
        finding_ids: fresh.iter().map(|f| f.id).collect(),
        timestamp: Utc::now(),
    });

    if let Err(e) = deps.sessions.save(&ctx.session).await {
        log::warn!("[{}] failed to persist session step: {:#}", ctx.agent_id, e);
    }
}
