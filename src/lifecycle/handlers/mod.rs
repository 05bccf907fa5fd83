mod checking_exit;
mod collecting_suggestions;
mod executing_action;
mod extracting_page;
mod getting_decision;
mod init;
mod processing_findings;
mod validating_decision;
mod waiting_checkpoint;

pub use checking_exit::CheckingExitHandler;
pub use collecting_suggestions::CollectingSuggestionsHandler;
pub use executing_action::ExecutingActionHandler;
pub use extracting_page::ExtractingPageHandler;
pub use getting_decision::GettingDecisionHandler;
pub use init::InitHandler;
pub use processing_findings::ProcessingFindingsHandler;
pub use validating_decision::ValidatingDecisionHandler;
pub use waiting_checkpoint::WaitingCheckpointHandler;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ExplorationConfig;
use crate::engine::bug_dedup::BugDeduplicationService;
use crate::engine::loop_detection::LoopDetectionService;
use crate::engine::navigation_planner::NavigationPlanner;
use crate::engine::url_discovery::UrlDiscoveryService;
use crate::events::{EventBus, EventSink};
use crate::providers::persona::{default_personas, PersonaSuggester};
use crate::providers::{BrowserPort, CheckpointHandler, DecisionOracle};
use crate::storage::{FindingStore, InMemoryStore, SessionStore};
use crate::tools::ToolRegistry;
use crate::types::{AgentContext, DecisionRequest, ExplorationState, StoppedReason};

/// One state of the exploration loop.
///
/// `run` advances the context in place and names the next state. An `Err`
/// sends the agent to ERROR with the error recorded on the context.
#[async_trait]
pub trait StateHandler: Send + Sync {
    fn state(&self) -> ExplorationState;
    async fn run(&self, ctx: &mut AgentContext, deps: &HandlerDeps) -> Result<ExplorationState>;
}

#[derive(Clone)]
pub struct HandlerDeps {
    pub browser: Arc<dyn BrowserPort>,
    pub oracle: Arc<dyn DecisionOracle>,
    pub config: ExplorationConfig,
    pub loop_detector: Arc<Mutex<LoopDetectionService>>,
    pub bug_dedup: Arc<Mutex<BugDeduplicationService>>,
    pub url_discovery: Arc<Mutex<UrlDiscoveryService>>,
    pub planner: NavigationPlanner,
    pub tools: ToolRegistry,
    pub personas: Vec<Arc<dyn PersonaSuggester>>,
    pub checkpoint: Option<Arc<dyn CheckpointHandler>>,
    pub findings: Arc<dyn FindingStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub events: Arc<dyn EventSink>,
}

impl HandlerDeps {
    pub fn new(
        browser: Arc<dyn BrowserPort>,
        oracle: Arc<dyn DecisionOracle>,
        config: ExplorationConfig,
    ) -> Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        let personas = if config.enable_personas {
            default_personas()
        } else {
            Vec::new()
        };

        Ok(Self {
            browser,
            oracle,
            loop_detector: Arc::new(Mutex::new(LoopDetectionService::new(
                config.loop_detection.clone(),
            ))),
            bug_dedup: Arc::new(Mutex::new(BugDeduplicationService::new(
                config.dedup_similarity_threshold,
            ))),
            url_discovery: Arc::new(Mutex::new(UrlDiscoveryService::new(
                config.url_discovery.clone(),
            )?)),
            planner: NavigationPlanner::new(),
            tools: ToolRegistry::with_defaults(),
            personas,
            checkpoint: None,
            findings: store.clone(),
            sessions: store,
            events: Arc::new(EventBus::default()),
            config,
        })
    }

    pub fn with_checkpoint(mut self, handler: Arc<dyn CheckpointHandler>) -> Self {
        self.checkpoint = Some(handler);
        self
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

    pub fn with_bug_dedup(mut self, bug_dedup: Arc<Mutex<BugDeduplicationService>>) -> Self {
        self.bug_dedup = bug_dedup;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_personas(mut self, personas: Vec<Arc<dyn PersonaSuggester>>) -> Self {
        self.personas = personas;
        self
    }
}

pub fn default_handlers() -> Vec<Arc<dyn StateHandler>> {
    vec![
        Arc::new(InitHandler),
        Arc::new(ExtractingPageHandler),
        Arc::new(CollectingSuggestionsHandler),
        Arc::new(GettingDecisionHandler),
        Arc::new(ValidatingDecisionHandler),
        Arc::new(ExecutingActionHandler),
        Arc::new(ProcessingFindingsHandler),
        Arc::new(CheckingExitHandler),
        Arc::new(WaitingCheckpointHandler),
    ]
}

// Poisoning only means another agent panicked mid-update; the data is still usable.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// URLs are the same page when they differ only by case or one trailing slash.
pub(crate) fn same_page(a: &str, b: &str) -> bool {
    fn canonical(url: &str) -> String {
        let lowered = url.trim().to_lowercase();
        match lowered.strip_suffix('/') {
            Some(stripped) => stripped.to_string(),
            None => lowered,
        }
    }
    canonical(a) == canonical(b)
}

pub(crate) fn build_request(ctx: &AgentContext, deps: &HandlerDeps) -> DecisionRequest {
    let frontier_summary = {
        let discovery = lock(&deps.url_discovery);
        deps.planner
            .summarize_frontier(&discovery.get_unvisited_urls(), &ctx.navigation)
    };
    let tools_enabled = !ctx.tools_disabled && !deps.tools.is_empty();

    DecisionRequest {
        objective: ctx.session.objective.clone(),
        page: ctx.page_context.clone().unwrap_or_default(),
        recent_actions: ctx.recent_actions.iter().cloned().collect(),
        persona_suggestions: ctx.persona_suggestions.clone(),
        frontier_summary,
        guidance: ctx.guidance.clone(),
        objective_amendment: ctx.objective_amendment.clone(),
        tools_enabled,
        available_tools: if tools_enabled {
            deps.tools.descriptors()
        } else {
            Vec::new()
        },
        step_number: ctx.step_number + 1,
        max_steps: ctx.session.max_steps,
        findings_so_far: ctx.findings.len(),
    }
}

// Closes out a step: stop on budget or user request, otherwise go round again.
pub(crate) fn finish_iteration(ctx: &mut AgentContext) -> ExplorationState {
    if ctx.step_number >= ctx.session.max_steps {
        log::info!(
            "[{}] step budget of {} reached",
            ctx.agent_id,
            ctx.session.max_steps
        );
        ctx.finish(StoppedReason::MaxSteps);
        return ExplorationState::Done;
    }
    if ctx.session.is_stopped() {
        ctx.finish(StoppedReason::StoppedByUser);
        return ExplorationState::Done;
    }

    ctx.clear_iteration();
    ExplorationState::ExtractingPage
}
