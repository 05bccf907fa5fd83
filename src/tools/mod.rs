pub mod page_inspection;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ExplorationError;
use crate::providers::BrowserPort;
use crate::types::PageState;

pub struct ToolContext<'a> {
    pub page: &'a PageState,
    pub browser: &'a dyn BrowserPort,
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    pub output: Value,
    // Problems the tool noticed; these become finding candidates.
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[async_trait]
pub trait ExplorationTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    async fn execute(&self, params: Value, context: &ToolContext<'_>) -> Result<ToolOutput>;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ExplorationTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(page_inspection::ConsoleErrorsTool));
        registry.register(Arc::new(page_inspection::LinkInventoryTool));
        registry.register(Arc::new(page_inspection::FindTextTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn ExplorationTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|tool| ToolDescriptor {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    pub async fn execute(
        &self,
        name: &str,
        params: Value,
        context: &ToolContext<'_>,
    ) -> Result<ToolOutput> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ExplorationError::Unsupported(format!("unknown tool: {}", name)))?;

        tool.execute(params, context).await
    }
}
