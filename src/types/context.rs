use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use super::{
    ActionDecision, ActionResult, AgentId, ExplorationSession, ExplorationState, Finding,
    LlmPageContext, PageState, StoppedReason, TokenUsage,
};
use crate::providers::persona::PersonaSuggestion;

pub const RECENT_ACTIONS_CAPACITY: usize = 10;

static LOGGED_IN_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(log\s?out|sign\s?out|my account)\b").expect("static regex"));
static CART_BADGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:cart|basket|bag)\s*[(\[:]?\s*([1-9]\d*)").expect("static regex")
});

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageProgress {
    pub url: String,
    pub actions: u32,
    pub bugs: u32,
    pub entered_at: DateTime<Utc>,
    pub tools_used: HashSet<String>,
}

impl PageProgress {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            actions: 0,
            bugs: 0,
            entered_at: Utc::now(),
            tools_used: HashSet::new(),
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        Utc::now()
            .signed_duration_since(self.entered_at)
            .num_seconds()
            .max(0) as u64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationState {
    pub is_authenticated: bool,
    pub has_items_in_cart: bool,
}

impl NavigationState {
    // Flags only ever turn on; a page without a cart badge does not empty the cart.
    pub fn observe(&mut self, page: &PageState) {
        if LOGGED_IN_TEXT.is_match(&page.visible_text) {
            self.is_authenticated = true;
        }
        if CART_BADGE.is_match(&page.visible_text) {
            self.has_items_in_cart = true;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointOrigin {
    Decision,
    Findings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingCheckpoint {
    pub reason: String,
    pub origin: CheckpointOrigin,
    pub proposed: Option<ActionDecision>,
}

// Reasons the validator sent a decision back to the oracle. Each fires at most once per step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rejection {
    EmptyValue,
    RepeatedTool,
    ActionLoop,
}

/// Run-time state of one exploring agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: AgentId,
    pub session: ExplorationSession,
    pub current_state: ExplorationState,

    pub current_page: Option<PageState>,
    pub page_context: Option<LlmPageContext>,
    pub current_url: Option<String>,
    pub page_progress: PageProgress,
    pub navigation: NavigationState,
    pub known_console_errors: usize,

    pub persona_suggestions: Vec<PersonaSuggestion>,
    pub current_decision: Option<ActionDecision>,
    pub original_decision: Option<ActionDecision>,
    pub approved_decision: Option<ActionDecision>,
    pub last_action_result: Option<ActionResult>,
    pub pending_issues: Vec<String>,

    pub guidance: Option<String>,
    pub objective_amendment: Option<String>,
    pub tools_disabled: bool,
    pub rejections: Vec<Rejection>,
    pub checkpoint: Option<PendingCheckpoint>,
    // step at which the oracle's proposal was last held for guidance
    pub last_checkpoint_step: Option<u32>,

    pub findings: Vec<Finding>,
    pub visited_urls: HashSet<String>,
    // exit targets already navigated to; a failed one stays on the frontier
    pub exit_targets_tried: HashSet<String>,
    pub recent_actions: VecDeque<String>,
    pub token_usage: TokenUsage,
    pub step_number: u32,

    pub should_exit: bool,
    pub exit_reason: Option<StoppedReason>,
    pub error: Option<String>,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<AgentId>, session: ExplorationSession) -> Self {
        let start_url = session.target_url.clone();
        Self {
            agent_id: agent_id.into(),
            session,
            current_state: ExplorationState::Init,
            current_page: None,
            page_context: None,
            current_url: None,
            page_progress: PageProgress::new(start_url),
            navigation: NavigationState::default(),
            known_console_errors: 0,
            persona_suggestions: Vec::new(),
            current_decision: None,
            original_decision: None,
            approved_decision: None,
            last_action_result: None,
            pending_issues: Vec::new(),
            guidance: None,
            objective_amendment: None,
            tools_disabled: false,
            rejections: Vec::new(),
            checkpoint: None,
            last_checkpoint_step: None,
            findings: Vec::new(),
            visited_urls: HashSet::new(),
            exit_targets_tried: HashSet::new(),
            recent_actions: VecDeque::with_capacity(RECENT_ACTIONS_CAPACITY),
            token_usage: TokenUsage::default(),
            step_number: 0,
            should_exit: false,
            exit_reason: None,
            error: None,
        }
    }

    pub fn record_action(&mut self, description: impl Into<String>) {
        if self.recent_actions.len() == RECENT_ACTIONS_CAPACITY {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(description.into());
    }

    pub fn add_usage(&mut self, usage: &TokenUsage) {
        self.token_usage.add(usage);
    }

    pub fn mark_visited(&mut self, url: impl Into<String>) {
        self.visited_urls.insert(url.into());
    }

    pub fn has_rejected(&self, rejection: Rejection) -> bool {
        self.rejections.contains(&rejection)
    }

    pub fn enter_page(&mut self, url: impl Into<String>) {
        let url = url.into();
        self.current_url = Some(url.clone());
        self.page_progress = PageProgress::new(url);
    }

    pub fn clear_iteration(&mut self) {
        self.persona_suggestions.clear();
        self.current_decision = None;
        self.original_decision = None;
        self.approved_decision = None;
        self.last_action_result = None;
        self.pending_issues.clear();
        self.objective_amendment = None;
        self.tools_disabled = false;
        self.rejections.clear();
        self.checkpoint = None;
    }

    pub fn finish(&mut self, reason: StoppedReason) {
        self.should_exit = true;
        self.exit_reason = Some(reason);
    }

    pub fn fail(&mut self, error: impl std::fmt::Display) {
        self.error = Some(error.to_string());
        self.finish(StoppedReason::Error);
    }

    pub fn current_page_url(&self) -> &str {
        self.current_url
            .as_deref()
            .unwrap_or(self.session.target_url.as_str())
    }
}

pub fn create_context(agent_id: impl Into<AgentId>, session: ExplorationSession) -> AgentContext {
    AgentContext::new(agent_id, session)
}
