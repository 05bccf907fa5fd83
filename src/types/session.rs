use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ActionDecision, ActionResult, AgentId, Finding, FindingId, SessionId, TokenUsage};
use crate::engine::url_discovery::DiscoveredUrl;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedReason {
    Completed,
    MaxSteps,
    StoppedByUser,
    Error,
}

impl StoppedReason {
    pub fn as_str(&self) -> &str {
        match self {
            StoppedReason::Completed => "completed",
            StoppedReason::MaxSteps => "max_steps",
            StoppedReason::StoppedByUser => "stopped_by_user",
            StoppedReason::Error => "error",
        }
    }

    pub fn session_status(&self) -> SessionStatus {
        match self {
            StoppedReason::Completed | StoppedReason::MaxSteps => SessionStatus::Completed,
            StoppedReason::StoppedByUser => SessionStatus::Stopped,
            StoppedReason::Error => SessionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationStep {
    pub step_number: u32,
    pub url: String,
    pub decision: ActionDecision,
    pub result: ActionResult,
    pub finding_ids: Vec<FindingId>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationSession {
    pub id: SessionId,
    pub target_url: String,
    pub objective: String,
    pub status: SessionStatus,
    pub max_steps: u32,
    pub steps: Vec<ExplorationStep>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ExplorationSession {
    pub fn new(target_url: impl Into<String>, objective: impl Into<String>, max_steps: u32) -> Self {
        Self {
            id: SessionId::new_v4(),
            target_url: target_url.into(),
            objective: objective.into(),
            status: SessionStatus::Running,
            max_steps,
            steps: Vec::new(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.status == SessionStatus::Stopped
    }

    pub fn finish(&mut self, reason: StoppedReason) {
        self.status = reason.session_status();
        self.ended_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplorationResult {
    pub session_id: SessionId,
    pub agent_id: AgentId,
    pub start_url: String,
    pub stopped_reason: StoppedReason,
    pub total_steps: usize,
    pub findings: Vec<Finding>,
    pub visited_urls: Vec<String>,
    pub discovered_urls: Vec<DiscoveredUrl>,
    pub token_usage: TokenUsage,
    pub summary: String,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExplorationResult {
    pub fn is_failure(&self) -> bool {
        self.stopped_reason == StoppedReason::Error
    }
}
