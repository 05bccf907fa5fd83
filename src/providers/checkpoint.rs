use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ActionDecision, ExplorationSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointAction {
    Continue,
    Stop,
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointResponse {
    pub action: CheckpointAction,
    #[serde(default)]
    pub guidance: Option<String>,
}

impl CheckpointResponse {
    pub fn proceed() -> Self {
        Self {
            action: CheckpointAction::Continue,
            guidance: None,
        }
    }

    pub fn stop() -> Self {
        Self {
            action: CheckpointAction::Stop,
            guidance: None,
        }
    }

    pub fn redirect(guidance: impl Into<String>) -> Self {
        Self {
            action: CheckpointAction::Redirect,
            guidance: Some(guidance.into()),
        }
    }
}

#[async_trait]
pub trait CheckpointHandler: Send + Sync {
    async fn on_checkpoint(
        &self,
        session: &ExplorationSession,
        reason: &str,
        proposed: Option<&ActionDecision>,
    ) -> Result<CheckpointResponse>;
}
