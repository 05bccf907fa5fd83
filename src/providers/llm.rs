use anyhow::Result;
use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Mutex;

use crate::error::ExplorationError;
use crate::types::TokenUsage;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    async fn complete(&self, messages: Vec<Message>) -> Result<Completion>;
}

// Rate limits and server-side failures are worth another attempt; everything else is not.
fn status_error(provider: &str, status: StatusCode, body: &str) -> ExplorationError {
    let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
    ExplorationError::oracle(format!("{} API error {}: {}", provider, status, body), retryable)
}

fn transport_error(provider: &str, err: reqwest::Error) -> ExplorationError {
    ExplorationError::oracle(format!("{} request failed: {}", provider, err), true)
}

async fn send_json<T: DeserializeOwned>(provider: &str, request: RequestBuilder) -> Result<T> {
    let response = request
        .send()
        .await
        .map_err(|e| transport_error(provider, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(status_error(provider, status, &body).into());
    }

    Ok(response
        .json::<T>()
        .await
        .map_err(|e| transport_error(provider, e))?)
}

#[derive(Debug, Clone)]
struct HostedChat {
    api_key: String,
    model: String,
    max_tokens: u32,
    http: reqwest::Client,
}

impl HostedChat {
    fn new(api_key: String, model: &str) -> Self {
        Self {
            api_key,
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    chat: HostedChat,
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    #[serde(default)]
    content: Vec<ContentBlock>,
    usage: Option<MessagesUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct MessagesUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            chat: HostedChat::new(api_key, "claude-3-5-sonnet-20240620"),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.chat.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.chat.max_tokens = max_tokens;
        self
    }

    // The messages API takes the system prompt as a top-level field.
    fn body(&self, messages: Vec<Message>) -> serde_json::Value {
        let (system, turns): (Vec<Message>, Vec<Message>) =
            messages.into_iter().partition(|m| m.role == Role::System);
        let system = system
            .into_iter()
            .map(|m| m.content)
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut body = json!({
            "model": self.chat.model,
            "max_tokens": self.chat.max_tokens,
            "messages": turns,
        });
        if !system.is_empty() {
            body["system"] = json!(system);
        }
        body
    }
}

#[async_trait]
impl LLMProvider for AnthropicProvider {
    async fn complete(&self, messages: Vec<Message>) -> Result<Completion> {
        let request = self
            .chat
            .http
            .post(ANTHROPIC_URL)
            .header("x-api-key", &self.chat.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&self.body(messages));
        let reply: MessagesReply = send_json("Anthropic", request).await?;

        let text: String = reply.content.into_iter().map(|block| block.text).collect();
        if text.is_empty() {
            return Err(ExplorationError::oracle("Anthropic reply had no text", true).into());
        }

        Ok(Completion {
            text,
            usage: reply
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
                .unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct OpenAIProvider {
    chat: HostedChat,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl OpenAIProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            chat: HostedChat::new(api_key, "gpt-4o"),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.chat.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.chat.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn complete(&self, messages: Vec<Message>) -> Result<Completion> {
        let request = self
            .chat
            .http
            .post(OPENAI_URL)
            .bearer_auth(&self.chat.api_key)
            .json(&json!({
                "model": self.chat.model,
                "max_tokens": self.chat.max_tokens,
                "messages": messages,
            }));
        let reply: ChatReply = send_json("OpenAI", request).await?;

        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| ExplorationError::oracle("OpenAI reply had no choices", true))?;

        Ok(Completion {
            text,
            usage: reply
                .usage
                .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
                .unwrap_or_default(),
        })
    }
}

/// Replays canned completions in order, repeating the last one once the script runs out.
pub struct MockLLMProvider {
    script: Mutex<Vec<String>>,
}

impl MockLLMProvider {
    pub fn new() -> Self {
        Self::with_response(r#"{"action":"done","reasoning":"nothing to do"}"#.to_string())
    }

    pub fn with_response(response: String) -> Self {
        Self::with_script(vec![response])
    }

    pub fn with_script(mut script: Vec<String>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
        }
    }
}

impl Default for MockLLMProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for MockLLMProvider {
    async fn complete(&self, _messages: Vec<Message>) -> Result<Completion> {
        let mut script = self.script.lock().unwrap_or_else(|e| e.into_inner());
        let text = match script.len() {
            0 => String::new(),
            1 => script[0].clone(),
            _ => script.pop().unwrap_or_default(),
        };
        Ok(Completion {
            text,
            usage: TokenUsage::new(10, 5),
        })
    }
}
