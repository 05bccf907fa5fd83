use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ExplorationError;
use crate::providers::llm::{LLMProvider, Message};
use crate::types::{ActionDecision, ActionType, DecisionRequest, DecisionResponse};

/// Chooses the next action for an agent and writes the closing summary.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    async fn decide_next_action(&self, request: &DecisionRequest) -> Result<DecisionResponse>;
    async fn generate_summary(&self, history: &[String], findings: &[String]) -> Result<String>;
}

const DECISION_SYSTEM_PROMPT: &str = "You are exploring a web application to find bugs. \
Given the current page, recent actions and hints, choose exactly one next action. \
Reply with a single JSON object: {\"action\": one of navigate|click|fill|select|hover|scroll|back|refresh|wait|tool|done, \
\"selector\": string?, \"value\": string?, \"toolName\": string?, \"toolParams\": object?, \
\"reasoning\": string, \"confidence\": number between 0 and 1, \"observedIssues\": [string]}. \
List every bug you can see on the page in observedIssues.";

const SUMMARY_SYSTEM_PROMPT: &str =
    "Summarize this web exploration session for a QA engineer in a short paragraph, then list the findings.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDecision {
    action: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default, alias = "tool_name")]
    tool_name: Option<String>,
    #[serde(default, alias = "tool_params")]
    tool_params: Option<Value>,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default, alias = "observed_issues")]
    observed_issues: Vec<String>,
}

pub struct LlmDecisionOracle {
    llm: Arc<dyn LLMProvider>,
}

impl LlmDecisionOracle {
    pub fn new(llm: Arc<dyn LLMProvider>) -> Self {
        Self { llm }
    }

    fn build_prompt(request: &DecisionRequest) -> Result<String> {
        let mut prompt = format!(
            "Objective: {}\nStep {} of {}. Findings so far: {}.\n\n",
            request.objective, request.step_number, request.max_steps, request.findings_so_far
        );
        if let Some(amendment) = &request.objective_amendment {
            prompt.push_str(&format!("IMPORTANT: {}\n\n", amendment));
        }
        if let Some(guidance) = &request.guidance {
            prompt.push_str(&format!("Guidance from the operator: {}\n\n", guidance));
        }
        if !request.tools_enabled {
            prompt.push_str("Tools are disabled for this step; do not choose the tool action.\n\n");
        }
        prompt.push_str(&serde_json::to_string_pretty(request)?);
        Ok(prompt)
    }
}

#[async_trait]
impl DecisionOracle for LlmDecisionOracle {
    async fn decide_next_action(&self, request: &DecisionRequest) -> Result<DecisionResponse> {
        let messages = vec![
            Message::system(DECISION_SYSTEM_PROMPT),
            Message::user(Self::build_prompt(request)?),
        ];

        let completion = self.llm.complete(messages).await?;
        let decision = parse_decision(&completion.text)?;

        Ok(DecisionResponse {
            decision,
            usage: completion.usage,
        })
    }

    async fn generate_summary(&self, history: &[String], findings: &[String]) -> Result<String> {
        let mut prompt = String::from("Actions taken:\n");
        for (i, action) in history.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, action));
        }
        prompt.push_str("\nFindings:\n");
        if findings.is_empty() {
            prompt.push_str("(none)\n");
        }
        for finding in findings {
            prompt.push_str(&format!("- {}\n", finding));
        }

        let completion = self
            .llm
            .complete(vec![Message::system(SUMMARY_SYSTEM_PROMPT), Message::user(prompt)])
            .await?;
        Ok(completion.text.trim().to_string())
    }
}

/// Pulls the first JSON object out of a model reply and turns it into a decision.
///
/// Models wrap JSON in prose or code fences often enough that malformed output
/// is reported as retryable.
pub fn parse_decision(text: &str) -> Result<ActionDecision> {
    let json = extract_json_object(text)
        .ok_or_else(|| ExplorationError::oracle("no JSON object in oracle reply", true))?;
    let raw: RawDecision = serde_json::from_str(json)
        .map_err(|e| ExplorationError::oracle(format!("malformed decision JSON: {}", e), true))?;

    let action = ActionType::from_str(&raw.action).ok_or_else(|| {
        ExplorationError::oracle(format!("unknown action '{}'", raw.action), true)
    })?;

    // numbers and booleans are legal fill values once stringified
    let value = raw.value.and_then(|v| match v {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    });

    let mut decision = ActionDecision::new(action, raw.reasoning);
    decision.selector = raw.selector.filter(|s| !s.trim().is_empty());
    decision.value = value;
    decision.tool_name = raw.tool_name;
    decision.tool_params = raw.tool_params;
    decision.observed_issues = raw
        .observed_issues
        .into_iter()
        .map(|i| i.trim().to_string())
        .filter(|i| !i.is_empty())
        .collect();
    if let Some(confidence) = raw.confidence {
        decision = decision.with_confidence(confidence);
    }
    Ok(decision)
}

fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::MockLLMProvider;
    use crate::types::LlmPageContext;

    fn request() -> DecisionRequest {
        DecisionRequest {
            objective: "find bugs".to_string(),
            page: LlmPageContext::default(),
            recent_actions: vec![],
            persona_suggestions: vec![],
            frontier_summary: String::new(),
            guidance: None,
            objective_amendment: Some("The previous decision had an empty value".to_string()),
            tools_enabled: false,
            available_tools: vec![],
            step_number: 1,
            max_steps: 10,
            findings_so_far: 0,
        }
    }

    #[test]
    fn test_parse_decision_inside_code_fence() {
        let reply = "Sure!\n```json\n{\"action\": \"type\", \"selector\": \"#qty\", \"value\": 3, \"confidence\": 1.7, \"observedIssues\": [\"Price shows NaN\", \" \"]}\n```";
        let decision = parse_decision(reply).unwrap();
        assert_eq!(decision.action, ActionType::Fill);
        assert_eq!(decision.value.as_deref(), Some("3"));
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.observed_issues, vec!["Price shows NaN".to_string()]);
    }

    #[test]
    fn test_malformed_replies_are_retryable() {
        for reply in ["no json here", "{\"action\": \"teleport\"}", "{\"action\": }"] {
            let err = parse_decision(reply).unwrap_err();
            assert!(crate::error::is_retryable(&err), "{}", reply);
        }
    }

    #[test]
    fn test_prompt_carries_amendment_and_tool_ban() {
        let prompt = LlmDecisionOracle::build_prompt(&request()).unwrap();
        assert!(prompt.contains("IMPORTANT: The previous decision had an empty value"));
        assert!(prompt.contains("Tools are disabled"));
    }

    #[tokio::test]
    async fn test_oracle_reports_usage() {
        let llm = Arc::new(MockLLMProvider::with_response(
            r##"{"action":"click","selector":"#buy","reasoning":"try checkout"}"##.to_string(),
        ));
        let oracle = LlmDecisionOracle::new(llm);
        let response = oracle.decide_next_action(&request()).await.unwrap();
        assert_eq!(response.decision.action, ActionType::Click);
        assert_eq!(response.decision.selector.as_deref(), Some("#buy"));
        assert_eq!(response.usage.total_tokens, 15);
    }
}
