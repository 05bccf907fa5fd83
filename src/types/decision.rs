use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::page::LlmPageContext;
use super::ActionType;
use crate::providers::persona::PersonaSuggestion;
use crate::tools::ToolDescriptor;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    pub fn add(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDecision {
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_params: Option<Value>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub observed_issues: Vec<String>,
}

fn default_confidence() -> f32 {
    0.5
}

impl ActionDecision {
    pub fn new(action: ActionType, reasoning: impl Into<String>) -> Self {
        Self {
            action,
            selector: None,
            value: None,
            tool_name: None,
            tool_params: None,
            reasoning: reasoning.into(),
            confidence: default_confidence(),
            observed_issues: Vec::new(),
        }
    }

    pub fn done(reasoning: impl Into<String>) -> Self {
        Self::new(ActionType::Done, reasoning).with_confidence(1.0)
    }

    pub fn navigate(url: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self::new(ActionType::Navigate, reasoning).with_value(url)
    }

    pub fn click(selector: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self::new(ActionType::Click, reasoning).with_selector(selector)
    }

    pub fn fill(
        selector: impl Into<String>,
        value: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self::new(ActionType::Fill, reasoning)
            .with_selector(selector)
            .with_value(value)
    }

    pub fn tool(name: impl Into<String>, params: Value, reasoning: impl Into<String>) -> Self {
        let mut decision = Self::new(ActionType::Tool, reasoning);
        decision.tool_name = Some(name.into());
        decision.tool_params = Some(params);
        decision
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_issues(mut self, issues: Vec<String>) -> Self {
        self.observed_issues = issues;
        self
    }

    pub fn has_empty_value(&self) -> bool {
        self.action.requires_value()
            && self
                .value
                .as_deref()
                .map(|v| v.trim().is_empty())
                .unwrap_or(true)
    }

    // Short human-readable form used for history and reproduction steps.
    pub fn describe(&self) -> String {
        match self.action {
            ActionType::Navigate => format!("navigate to {}", self.value.as_deref().unwrap_or("?")),
            ActionType::Fill => format!(
                "fill {} with \"{}\"",
                self.selector.as_deref().unwrap_or("?"),
                self.value.as_deref().unwrap_or("")
            ),
            ActionType::Select => format!(
                "select \"{}\" in {}",
                self.value.as_deref().unwrap_or(""),
                self.selector.as_deref().unwrap_or("?")
            ),
            ActionType::Tool => format!("run tool {}", self.tool_name.as_deref().unwrap_or("?")),
            ActionType::Click | ActionType::Hover => format!(
                "{} {}",
                self.action.as_str(),
                self.selector.as_deref().unwrap_or("?")
            ),
            other => other.as_str().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ActionResult {
    pub fn ok(duration_ms: u64) -> Self {
        Self {
            success: true,
            error: None,
            duration_ms,
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    pub objective: String,
    pub page: LlmPageContext,
    pub recent_actions: Vec<String>,
    pub persona_suggestions: Vec<PersonaSuggestion>,
    pub frontier_summary: String,
    pub guidance: Option<String>,
    pub objective_amendment: Option<String>,
    pub tools_enabled: bool,
    pub available_tools: Vec<ToolDescriptor>,
    pub step_number: u32,
    pub max_steps: u32,
    pub findings_so_far: usize,
}

#[derive(Debug, Clone)]
pub struct DecisionResponse {
    pub decision: ActionDecision,
    pub usage: TokenUsage,
}
