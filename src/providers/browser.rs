use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::engine::url_discovery::PageScanner;
use crate::types::{ActionResult, PageLink, PageState};

/// The browser an agent drives. Every agent owns its own instance.
///
/// Action methods report a failed interaction through `ActionResult::success`
/// and reserve `Err` for the driver itself breaking.
#[async_trait]
pub trait BrowserPort: Send + Sync {
    async fn initialize(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;

    async fn navigate(&self, url: &str) -> Result<ActionResult>;
    async fn click(&self, selector: &str) -> Result<ActionResult>;
    async fn fill(&self, selector: &str, value: &str) -> Result<ActionResult>;
    async fn select(&self, selector: &str, value: &str) -> Result<ActionResult>;
    async fn hover(&self, selector: &str) -> Result<ActionResult>;
    async fn go_back(&self) -> Result<ActionResult>;
    async fn refresh(&self) -> Result<ActionResult>;

    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn extract_page_state(&self) -> Result<PageState>;
    async fn extract_links(&self) -> Result<Vec<PageLink>>;
    async fn get_current_url(&self) -> Result<String>;
    async fn get_title(&self) -> Result<String>;

    // Every console error captured since the browser was initialized, oldest first.
    fn console_errors(&self) -> Vec<String>;
}

pub async fn evaluate_as<T: DeserializeOwned>(browser: &dyn BrowserPort, script: &str) -> Result<T> {
    let value = browser.evaluate(script).await?;
    Ok(serde_json::from_value(value)?)
}

#[async_trait]
impl<B: BrowserPort + ?Sized> PageScanner for B {
    async fn scan_links(&self) -> Result<Vec<PageLink>> {
        self.extract_links().await
    }
}

#[async_trait]
pub trait BrowserFactory: Send + Sync {
    async fn create(&self) -> Result<std::sync::Arc<dyn BrowserPort>>;
}
