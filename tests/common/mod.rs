//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use webprobe::config::ExplorationConfig;
use webprobe::error::ExplorationError;
use webprobe::providers::{
    BrowserFactory, BrowserPort, CheckpointHandler, CheckpointResponse, DecisionOracle,
};
use webprobe::types::{
    ActionDecision, ActionResult, DecisionRequest, DecisionResponse, ExplorationSession,
    PageLink, PageState, TokenUsage,
};

/// A fake site: page text and outbound links keyed by URL.
#[derive(Debug, Clone, Default)]
pub struct Site {
    pages: HashMap<String, (String, Vec<String>)>,
    broken: HashSet<String>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, text: &str, links: &[&str]) -> Self {
        self.pages.insert(
            url.to_string(),
            (text.to_string(), links.iter().map(|l| l.to_string()).collect()),
        );
        self
    }

    /// Navigating to `url` reports a failed action.
    pub fn broken(mut self, url: &str) -> Self {
        self.broken.insert(url.to_string());
        self
    }
}

#[derive(Default)]
struct BrowserState {
    current: String,
    history: Vec<String>,
    console: Vec<String>,
}

pub struct ScriptedBrowser {
    site: Site,
    state: Mutex<BrowserState>,
    closes: AtomicUsize,
    link_scans: AtomicUsize,
    fail_initialize: bool,
    console_on_click: Option<String>,
    navigations: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
}

impl ScriptedBrowser {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            state: Mutex::new(BrowserState::default()),
            closes: AtomicUsize::new(0),
            link_scans: AtomicUsize::new(0),
            fail_initialize: false,
            console_on_click: None,
            navigations: Mutex::new(Vec::new()),
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    /// Every click logs `message` to the console.
    pub fn console_on_click(mut self, message: &str) -> Self {
        self.console_on_click = Some(message.to_string());
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Calls to `extract_links` made outside `extract_page_state`.
    pub fn link_scans(&self) -> usize {
        self.link_scans.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    fn current(&self) -> String {
        self.state.lock().unwrap().current.clone()
    }

    fn links(&self) -> Vec<PageLink> {
        let hrefs = self
            .site
            .pages
            .get(&self.current())
            .map(|(_, links)| links.clone())
            .unwrap_or_default();
        hrefs
            .into_iter()
            .map(|href| PageLink {
                text: href.trim_start_matches('/').to_string(),
                href: self.resolve(&href),
            })
            .collect()
    }

    fn resolve(&self, href: &str) -> String {
        if href.starts_with("http") {
            return href.to_string();
        }
        let current = self.current();
        let origin = current
            .splitn(4, '/')
            .take(3)
            .collect::<Vec<_>>()
            .join("/");
        format!("{}{}", origin, href)
    }
}

#[async_trait]
impl BrowserPort for ScriptedBrowser {
    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize {
            return Err(ExplorationError::Browser("no display available".to_string()).into());
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<ActionResult> {
        self.navigations.lock().unwrap().push(url.to_string());
        if self.site.broken.contains(url) {
            return Ok(ActionResult::failed("HTTP 502", 3));
        }
        let mut state = self.state.lock().unwrap();
        if !state.current.is_empty() {
            let previous = state.current.clone();
            state.history.push(previous);
        }
        state.current = url.to_string();
        Ok(ActionResult::ok(3))
    }

    async fn click(&self, selector: &str) -> Result<ActionResult> {
        self.clicks.lock().unwrap().push(selector.to_string());
        if let Some(message) = &self.console_on_click {
            self.state.lock().unwrap().console.push(message.clone());
        }
        Ok(ActionResult::ok(2))
    }

    async fn fill(&self, _selector: &str, _value: &str) -> Result<ActionResult> {
        Ok(ActionResult::ok(2))
    }

    async fn select(&self, _selector: &str, _value: &str) -> Result<ActionResult> {
        Ok(ActionResult::ok(2))
    }

    async fn hover(&self, _selector: &str) -> Result<ActionResult> {
        Ok(ActionResult::ok(1))
    }

    async fn go_back(&self) -> Result<ActionResult> {
        let mut state = self.state.lock().unwrap();
        match state.history.pop() {
            Some(previous) => {
                state.current = previous;
                Ok(ActionResult::ok(1))
            }
            None => Ok(ActionResult::failed("no history", 1)),
        }
    }

    async fn refresh(&self) -> Result<ActionResult> {
        Ok(ActionResult::ok(1))
    }

    async fn evaluate(&self, _script: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn extract_page_state(&self) -> Result<PageState> {
        let current = self.current();
        let text = self
            .site
            .pages
            .get(&current)
            .map(|(text, _)| text.clone())
            .unwrap_or_default();
        Ok(PageState {
            url: current,
            title: "Scripted page".to_string(),
            visible_text: text,
            console_errors: self.console_errors(),
            links: self.links(),
            ..Default::default()
        })
    }

    async fn extract_links(&self) -> Result<Vec<PageLink>> {
        self.link_scans.fetch_add(1, Ordering::SeqCst);
        Ok(self.links())
    }

    async fn get_current_url(&self) -> Result<String> {
        Ok(self.current())
    }

    async fn get_title(&self) -> Result<String> {
        Ok("Scripted page".to_string())
    }

    fn console_errors(&self) -> Vec<String> {
        self.state.lock().unwrap().console.clone()
    }
}

/// Hands out a fresh [`ScriptedBrowser`] over the same site for every agent.
pub struct ScriptedBrowserFactory {
    site: Site,
    created: Mutex<Vec<Arc<ScriptedBrowser>>>,
}

impl ScriptedBrowserFactory {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn browsers(&self) -> Vec<Arc<ScriptedBrowser>> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserFactory for ScriptedBrowserFactory {
    async fn create(&self) -> Result<Arc<dyn BrowserPort>> {
        let browser = Arc::new(ScriptedBrowser::new(self.site.clone()));
        self.created.lock().unwrap().push(browser.clone());
        Ok(browser)
    }
}

/// Replays decisions in order, then says done. Every request is kept for inspection.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<ActionDecision>>,
    repeat: Option<ActionDecision>,
    fail_with: Option<ExplorationError>,
    requests: Mutex<Vec<DecisionRequest>>,
    summaries: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(script: Vec<ActionDecision>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            fail_with: None,
            requests: Mutex::new(Vec::new()),
            summaries: AtomicUsize::new(0),
        }
    }

    pub fn done_first() -> Self {
        Self::new(vec![ActionDecision::done("nothing left to test")])
    }

    /// Returns `decision` forever once the script runs out.
    pub fn repeating(decision: ActionDecision) -> Self {
        let mut oracle = Self::new(Vec::new());
        oracle.repeat = Some(decision);
        oracle
    }

    pub fn retryable_failure() -> Self {
        let mut oracle = Self::new(Vec::new());
        oracle.fail_with = Some(ExplorationError::oracle("HTTP 503", true));
        oracle
    }

    pub fn requests(&self) -> Vec<DecisionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl DecisionOracle for ScriptedOracle {
    async fn decide_next_action(&self, request: &DecisionRequest) -> Result<DecisionResponse> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(ExplorationError::Oracle { message, retryable }) = &self.fail_with {
            return Err(ExplorationError::oracle(message.clone(), *retryable).into());
        }

        let next = self.script.lock().unwrap().pop_front();
        let decision = next
            .or_else(|| self.repeat.clone())
            .unwrap_or_else(|| ActionDecision::done("script finished"));
        Ok(DecisionResponse {
            decision,
            usage: TokenUsage::new(100, 20),
        })
    }

    async fn generate_summary(&self, history: &[String], findings: &[String]) -> Result<String> {
        self.summaries.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} steps, {} findings", history.len(), findings.len()))
    }
}

/// Answers every checkpoint with the same response and records what it was asked.
pub struct FixedCheckpoint {
    response: CheckpointResponse,
    calls: Mutex<Vec<(String, Option<ActionDecision>)>>,
}

impl FixedCheckpoint {
    pub fn new(response: CheckpointResponse) -> Self {
        Self {
            response,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, Option<ActionDecision>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckpointHandler for FixedCheckpoint {
    async fn on_checkpoint(
        &self,
        _session: &ExplorationSession,
        reason: &str,
        proposed: Option<&ActionDecision>,
    ) -> Result<CheckpointResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((reason.to_string(), proposed.cloned()));
        Ok(self.response.clone())
    }
}

/// Config with instant retries and no personas so runs are deterministic.
pub fn fast_config() -> ExplorationConfig {
    let mut config = ExplorationConfig::default();
    config.enable_personas = false;
    config.retry.initial_delay_ms = 1;
    config
}

pub fn shop() -> Site {
    Site::new()
        .page("https://shop.test/", "Welcome to the shop", &["/login", "/about"])
        .page("https://shop.test/login", "Sign in", &[])
        .page("https://shop.test/about", "About us", &[])
}

