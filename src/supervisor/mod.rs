pub mod agent_supervisor;
pub mod shared_state;
pub mod work_queue;

pub use agent_supervisor::AgentSupervisor;
pub use shared_state::SharedExplorationState;
pub use work_queue::{PageTask, TaskSource, WorkQueue};

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, Finding, StoppedReason};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_concurrency: usize,
    // Total steps across all agents before the supervisor stops handing out work.
    pub global_max_steps: u32,
    pub max_steps_per_agent: u32,
    pub idle_poll_interval_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            global_max_steps: 200,
            max_steps_per_agent: 25,
            idle_poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorStopReason {
    BudgetExhausted,
    QueueDrained,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub url: String,
    pub agent_id: AgentId,
    pub stopped_reason: StoppedReason,
    pub steps: usize,
    pub findings: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorReport {
    pub findings: Vec<Finding>,
    pub visited_urls: Vec<String>,
    pub agents_run: usize,
    pub tasks_failed: usize,
    pub total_steps: u32,
    pub stopped_reason: SupervisorStopReason,
    pub tasks: Vec<TaskReport>,
}

pub(crate) fn url_key(url: &str) -> String {
    let trimmed = url.trim();
    trimmed.strip_suffix('/').unwrap_or(trimmed).to_string()
}
