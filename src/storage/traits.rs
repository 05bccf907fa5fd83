use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ExplorationSession, Finding, SessionId};

#[async_trait]
pub trait FindingStore: Send + Sync {
    async fn save(&self, finding: &Finding) -> Result<()>;
    async fn find_by_session_id(&self, session_id: SessionId) -> Result<Vec<Finding>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save(&self, session: &ExplorationSession) -> Result<()>;
    async fn get(&self, session_id: SessionId) -> Result<Option<ExplorationSession>>;
}
