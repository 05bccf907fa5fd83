pub mod browser;
pub mod checkpoint;
pub mod http_browser;
pub mod llm;
pub mod ollama;
pub mod oracle;
pub mod persona;

pub use browser::{BrowserFactory, BrowserPort};
pub use checkpoint::{CheckpointAction, CheckpointHandler, CheckpointResponse};
pub use http_browser::{HttpBrowser, HttpBrowserFactory};
pub use llm::{AnthropicProvider, LLMProvider, OpenAIProvider};
pub use ollama::OllamaProvider;
pub use oracle::{DecisionOracle, LlmDecisionOracle};
pub use persona::{PersonaSuggester, PersonaSuggestion};
