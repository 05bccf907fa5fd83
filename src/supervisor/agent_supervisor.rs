use anyhow::Result;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use super::{
    PageTask, SharedExplorationState, SupervisorConfig, SupervisorReport, SupervisorStopReason,
    TaskReport, TaskSource, WorkQueue,
};
use crate::config::ExplorationConfig;
use crate::engine::bug_dedup::BugDeduplicationService;
use crate::engine::explorer::ExplorationAgent;
use crate::error::ExplorationError;
use crate::events::{EventBus, EventSink};
use crate::lifecycle::HandlerDeps;
use crate::providers::{BrowserFactory, CheckpointHandler, DecisionOracle};
use crate::storage::{FindingStore, InMemoryStore, SessionStore};
use crate::types::{AgentId, ExplorationResult, StoppedReason};

const SEED_PRIORITY: u32 = 10;

/// Runs a pool of exploration agents over a shared work queue.
///
/// Every agent gets its own browser and state machine. Agents only meet
/// through [`SharedExplorationState`], the work queue and the shared bug
/// deduplication ledger.
#[derive(Clone)]
pub struct AgentSupervisor {
    config: SupervisorConfig,
    exploration: ExplorationConfig,
    browsers: Arc<dyn BrowserFactory>,
    oracle: Arc<dyn DecisionOracle>,
    shared: Arc<SharedExplorationState>,
    bug_dedup: Arc<std::sync::Mutex<BugDeduplicationService>>,
    findings: Arc<dyn FindingStore>,
    sessions: Arc<dyn SessionStore>,
    events: Arc<dyn EventSink>,
    checkpoint: Option<Arc<dyn CheckpointHandler>>,
    agent_counter: Arc<AtomicUsize>,
}

struct Dispatch {
    queue: WorkQueue,
    active: usize,
    // Steps charged by finished runs plus steps reserved by running ones.
    steps_used: u32,
    agents_run: usize,
    tasks_failed: usize,
    tasks: Vec<TaskReport>,
}

enum Claim {
    Task(PageTask, u32),
    Wait,
    Stop,
}

impl Dispatch {
    fn new(queue: WorkQueue) -> Self {
        Self {
            queue,
            active: 0,
            steps_used: 0,
            agents_run: 0,
            tasks_failed: 0,
            tasks: Vec::new(),
        }
    }

    fn claim(&mut self, config: &SupervisorConfig) -> Claim {
        let remaining = config.global_max_steps.saturating_sub(self.steps_used);
        if remaining == 0 {
            // running agents may still hand back unused reservations
            return if self.active > 0 { Claim::Wait } else { Claim::Stop };
        }
        match self.queue.dequeue() {
            Some(task) => {
                let budget = config.max_steps_per_agent.min(remaining).max(1);
                self.steps_used += budget;
                self.active += 1;
                Claim::Task(task, budget)
            }
            None if self.active == 0 => Claim::Stop,
            None => Claim::Wait,
        }
    }

    fn release(&mut self, reserved: u32, charged: u32) {
        self.steps_used = self.steps_used.saturating_sub(reserved) + charged;
        self.active = self.active.saturating_sub(1);
    }
}

impl AgentSupervisor {
    pub fn new(
        config: SupervisorConfig,
        exploration: ExplorationConfig,
        browsers: Arc<dyn BrowserFactory>,
        oracle: Arc<dyn DecisionOracle>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let mut config = config;
        config.max_steps_per_agent = config.max_steps_per_agent.min(exploration.max_steps);
        Self {
            bug_dedup: Arc::new(std::sync::Mutex::new(BugDeduplicationService::new(
                exploration.dedup_similarity_threshold,
            ))),
            config,
            exploration,
            browsers,
            oracle,
            shared: Arc::new(SharedExplorationState::new()),
            findings: store.clone(),
            sessions: store,
            events: Arc::new(EventBus::default()),
            checkpoint: None,
            agent_counter: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_stores(mut self, findings: Arc<dyn FindingStore>, sessions: Arc<dyn SessionStore>) -> Self {
        self.findings = findings;
        self.sessions = sessions;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_checkpoint(mut self, handler: Arc<dyn CheckpointHandler>) -> Self {
        self.checkpoint = Some(handler);
        self
    }

    pub fn shared_state(&self) -> Arc<SharedExplorationState> {
        self.shared.clone()
    }

    pub async fn run(&self, seeds: &[String]) -> Result<SupervisorReport> {
        let mut queue = WorkQueue::new();
        for seed in seeds {
            queue.enqueue(PageTask::new(seed.clone(), SEED_PRIORITY, TaskSource::Initial));
        }
        if queue.size() == 0 {
            return Err(ExplorationError::config("at least one seed URL is required").into());
        }

        let workers = self.config.max_concurrency.min(queue.size()).max(1);
        log::info!(
            "supervising {} seed(s) with {} worker(s), budget {} steps",
            queue.size(),
            workers,
            self.config.global_max_steps
        );

        let dispatch = Arc::new(Mutex::new(Dispatch::new(queue)));
        let mut pool = JoinSet::new();
        for index in 0..workers {
            pool.spawn(self.clone().worker(index, dispatch.clone()));
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                log::error!("worker task aborted: {}", e);
            }
        }

        let dispatch = dispatch.lock().await;
        let stopped_reason = if dispatch.steps_used >= self.config.global_max_steps {
            SupervisorStopReason::BudgetExhausted
        } else {
            SupervisorStopReason::QueueDrained
        };

        let report = SupervisorReport {
            findings: self.shared.get_findings().await,
            visited_urls: self.shared.visited_urls().await,
            agents_run: dispatch.agents_run,
            tasks_failed: dispatch.tasks_failed,
            total_steps: dispatch.steps_used,
            stopped_reason,
            tasks: dispatch.tasks.clone(),
        };
        log::info!(
            "supervisor stopped ({:?}): {} agents, {} failed tasks, {} steps, {} findings",
            report.stopped_reason,
            report.agents_run,
            report.tasks_failed,
            report.total_steps,
            report.findings.len()
        );
        Ok(report)
    }

    async fn worker(self, index: usize, dispatch: Arc<Mutex<Dispatch>>) {
        let idle = Duration::from_millis(self.config.idle_poll_interval_ms.max(1));
        loop {
            let claim = dispatch.lock().await.claim(&self.config);
            let (task, budget) = match claim {
                Claim::Task(task, budget) => (task, budget),
                Claim::Wait => {
                    log::trace!("worker {} idle", index);
                    tokio::time::sleep(idle).await;
                    continue;
                }
                Claim::Stop => break,
            };

            if self.shared.has_visited(&task.url).await {
                log::debug!("worker {} skipping already visited {}", index, task.url);
                let mut dispatch = dispatch.lock().await;
                dispatch.queue.complete(&task.url);
                dispatch.release(budget, 0);
                continue;
            }

            let agent_id = format!("agent-{}", self.agent_counter.fetch_add(1, Ordering::SeqCst));
            log::info!(
                "worker {} dequeued {} (priority {}, attempt {}) for {}",
                index,
                task.url,
                task.priority,
                task.attempts,
                agent_id
            );
            let outcome = self.explore_task(&agent_id, &task, budget).await;
            self.record(&dispatch, &task, agent_id, budget, outcome).await;
        }
        log::debug!("worker {} exiting", index);
    }

    async fn explore_task(&self, agent_id: &str, task: &PageTask, max_steps: u32) -> Result<ExplorationResult> {
        let browser = self.browsers.create().await?;
        let mut deps = HandlerDeps::new(browser, self.oracle.clone(), self.exploration.clone())?
            .with_bug_dedup(self.bug_dedup.clone())
            .with_stores(self.findings.clone(), self.sessions.clone())
            .with_events(self.events.clone());
        if let Some(checkpoint) = &self.checkpoint {
            deps = deps.with_checkpoint(checkpoint.clone());
        }

        ExplorationAgent::new(agent_id, deps)
            .explore(&task.url, &self.exploration.objective, max_steps)
            .await
    }

    async fn record(
        &self,
        dispatch: &Mutex<Dispatch>,
        task: &PageTask,
        agent_id: AgentId,
        budget: u32,
        outcome: Result<ExplorationResult>,
    ) {
        let (report, charged, succeeded) = match outcome {
            Ok(result) => {
                let succeeded = result.stopped_reason != StoppedReason::Error;
                self.merge(&result, succeeded).await;
                let charged = (result.total_steps as u32).max(1);
                let report = TaskReport {
                    url: task.url.clone(),
                    agent_id,
                    stopped_reason: result.stopped_reason,
                    steps: result.total_steps,
                    findings: result.findings.len(),
                    error: result.error,
                };
                (report, charged, succeeded)
            }
            Err(e) => {
                log::error!("[{}] exploration of {} aborted: {:#}", agent_id, task.url, e);
                let report = TaskReport {
                    url: task.url.clone(),
                    agent_id,
                    stopped_reason: StoppedReason::Error,
                    steps: 0,
                    findings: 0,
                    error: Some(format!("{:#}", e)),
                };
                (report, 1, false)
            }
        };

        let mut frontier = Vec::new();
        while let Some(url) = self.shared.pop_discovered_url().await {
            frontier.push(url);
        }

        let mut dispatch = dispatch.lock().await;
        if succeeded {
            dispatch.queue.complete(&task.url);
            log::info!("[{}] completed {}", report.agent_id, task.url);
        } else {
            dispatch.tasks_failed += 1;
            if let Some(priority) = dispatch.queue.fail(&task.url) {
                log::warn!(
                    "[{}] failed {}, requeued at priority {}",
                    report.agent_id,
                    task.url,
                    priority
                );
            }
        }

        for url in frontier {
            let discovered = PageTask::new(
                url.normalized_url.clone(),
                url.category.task_priority(),
                TaskSource::Discovered,
            )
            .with_metadata(json!({
                "category": url.category.as_str(),
                "link_text": url.link_text,
                "discovered_from": task.url,
            }));
            dispatch.queue.enqueue(discovered);
        }

        dispatch.agents_run += 1;
        dispatch.tasks.push(report);
        dispatch.release(budget, charged);
    }

    // Findings always merge; visited pages and the frontier only when the run succeeded.
    async fn merge(&self, result: &ExplorationResult, succeeded: bool) {
        let mut merged = 0;
        for finding in &result.findings {
            if self.shared.add_finding(finding.clone()).await {
                merged += 1;
            }
        }
        log::debug!(
            "[{}] merged {} of {} findings",
            result.agent_id,
            merged,
            result.findings.len()
        );

        if !succeeded {
            return;
        }
        self.shared.mark_visited(&result.start_url).await;
        for url in &result.visited_urls {
            self.shared.mark_visited(url).await;
        }
        for url in &result.discovered_urls {
            if !url.visited {
                self.shared.add_discovered_url(url.clone()).await;
            }
        }
    }
}
