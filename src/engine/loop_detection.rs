use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;

use crate::types::{ActionDecision, ActionType};

const MAX_NORMALIZED_VALUE: usize = 50;
const QUOTE_CHARS: [char; 6] = ['"', '\'', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}'];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDetectionConfig {
    pub tool_history_size: usize,
    pub action_history_size: usize,
    pub tool_loop_threshold: usize,
    pub action_loop_threshold: usize,
}

impl Default for LoopDetectionConfig {
    fn default() -> Self {
        Self {
            tool_history_size: 10,
            action_history_size: 20,
            tool_loop_threshold: 3,
            action_loop_threshold: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopType {
    Tool,
    Action,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDetectionResult {
    pub is_loop: bool,
    pub loop_type: LoopType,
    pub pattern: String,
    pub count: usize,
}

/// Remembers recent tool calls and actions and reports when one keeps repeating.
///
/// Both buffers are kept most-recent-first and are bounded by the configured sizes.
#[derive(Debug, Clone)]
pub struct LoopDetectionService {
    config: LoopDetectionConfig,
    tool_history: VecDeque<String>,
    action_history: VecDeque<String>,
}

impl LoopDetectionService {
    pub fn new(config: LoopDetectionConfig) -> Self {
        Self {
            tool_history: VecDeque::with_capacity(config.tool_history_size),
            action_history: VecDeque::with_capacity(config.action_history_size),
            config,
        }
    }

    pub fn config(&self) -> &LoopDetectionConfig {
        &self.config
    }

    pub fn record_tool_call(&mut self, name: &str, params: Option<&Value>) {
        let signature = tool_signature(name, params);
        push_bounded(&mut self.tool_history, signature, self.config.tool_history_size);
    }

    pub fn record_action(&mut self, decision: &ActionDecision) {
        let signature = action_signature(decision);
        push_bounded(
            &mut self.action_history,
            signature,
            self.config.action_history_size,
        );
    }

    pub fn record(&mut self, decision: &ActionDecision) {
        if decision.action == ActionType::Tool {
            self.record_tool_call(
                decision.tool_name.as_deref().unwrap_or(""),
                decision.tool_params.as_ref(),
            );
        } else {
            self.record_action(decision);
        }
    }

    pub fn detect_tool_loop(&self, name: &str, params: Option<&Value>) -> LoopDetectionResult {
        let pattern = tool_signature(name, params);
        let count = self.tool_history.iter().filter(|s| **s == pattern).count();
        LoopDetectionResult {
            is_loop: count >= self.config.tool_loop_threshold,
            loop_type: LoopType::Tool,
            pattern,
            count,
        }
    }

    pub fn detect_action_loop(&self, decision: &ActionDecision) -> LoopDetectionResult {
        let pattern = action_signature(decision);
        let count = self.action_history.iter().filter(|s| **s == pattern).count();
        LoopDetectionResult {
            is_loop: count >= self.config.action_loop_threshold,
            loop_type: LoopType::Action,
            pattern,
            count,
        }
    }

    pub fn detect_loop(&self, decision: &ActionDecision) -> LoopDetectionResult {
        if decision.action == ActionType::Tool {
            self.detect_tool_loop(
                decision.tool_name.as_deref().unwrap_or(""),
                decision.tool_params.as_ref(),
            )
        } else {
            self.detect_action_loop(decision)
        }
    }

    pub fn reset(&mut self) {
        self.tool_history.clear();
        self.action_history.clear();
    }

    pub fn reset_action_history(&mut self) {
        self.action_history.clear();
    }

    pub fn action_history_len(&self) -> usize {
        self.action_history.len()
    }

    pub fn tool_history_len(&self) -> usize {
        self.tool_history.len()
    }
}

impl Default for LoopDetectionService {
    fn default() -> Self {
        Self::new(LoopDetectionConfig::default())
    }
}

fn push_bounded(history: &mut VecDeque<String>, signature: String, capacity: usize) {
    history.push_front(signature);
    history.truncate(capacity);
}

// Lower-cases, drops straight and curly quotes, and keeps the first 50 characters.
pub fn normalize_value(value: &str) -> String {
    value
        .to_lowercase()
        .chars()
        .filter(|c| !QUOTE_CHARS.contains(c))
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_NORMALIZED_VALUE)
        .collect()
}

pub fn action_signature(decision: &ActionDecision) -> String {
    format!(
        "{}|{}|{}|{}",
        decision.action.as_str(),
        decision.selector.as_deref().unwrap_or(""),
        normalize_value(decision.value.as_deref().unwrap_or("")),
        decision.tool_name.as_deref().unwrap_or("")
    )
}

pub fn tool_signature(name: &str, params: Option<&Value>) -> String {
    // serde_json maps are key-ordered, so equal params always serialize identically
    let params = params
        .filter(|p| !p.is_null())
        .map(|p| p.to_string().to_lowercase())
        .unwrap_or_default();
    format!("{}:{}", name, params)
}
