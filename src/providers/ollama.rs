use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExplorationError;
use crate::providers::llm::{Completion, LLMProvider, Message};
use crate::types::TokenUsage;

const DEFAULT_HOST: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.1";

// Local model served by an Ollama daemon. Replies are forced into JSON mode.
pub struct OllamaProvider {
    host: String,
    model: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct ChatReply {
    message: Option<ReplyMessage>,
    #[serde(default)]
    prompt_eval_count: u64,
    #[serde(default)]
    eval_count: u64,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: String,
}

impl OllamaProvider {
    pub fn new(host: Option<String>, model: Option<String>) -> Self {
        let host = host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        Self {
            host: host.trim_end_matches('/').to_string(),
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.host)
    }
}

#[async_trait]
impl LLMProvider for OllamaProvider {
    async fn complete(&self, messages: Vec<Message>) -> Result<Completion> {
        let body = ChatBody {
            model: &self.model,
            messages: &messages,
            stream: false,
            format: "json",
        };

        let response = self
            .http
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| ExplorationError::oracle(format!("Ollama unreachable: {}", e), true))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExplorationError::oracle(
                format!("Ollama returned {}: {}", status, detail),
                status.is_server_error(),
            )
            .into());
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ExplorationError::oracle(format!("unreadable Ollama reply: {}", e), true))?;
        let text = reply
            .message
            .map(|m| m.content)
            .ok_or_else(|| ExplorationError::oracle("Ollama reply had no message", true))?;

        Ok(Completion {
            text,
            usage: TokenUsage::new(reply.prompt_eval_count, reply.eval_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_and_host_normalization() {
        let local = OllamaProvider::new(None, None);
        assert_eq!(local.model, DEFAULT_MODEL);
        assert_eq!(local.chat_url(), "http://localhost:11434/api/chat");

        let remote = OllamaProvider::new(Some("http://gpu-box:11434/".to_string()), Some("qwen2".to_string()));
        assert_eq!(remote.chat_url(), "http://gpu-box:11434/api/chat");
        assert_eq!(remote.model, "qwen2");
    }

    #[test]
    fn test_body_requests_json_without_streaming() {
        let messages = vec![Message::user("next?")];
        let body = ChatBody {
            model: "llama3.1",
            messages: &messages,
            stream: false,
            format: "json",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["stream"], false);
        assert_eq!(json["format"], "json");
        assert_eq!(json["messages"][0]["role"], "user");
    }
}
