use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::traits::{FindingStore, SessionStore};
use crate::types::{ExplorationSession, Finding, FindingId, SessionId};

#[derive(Clone)]
pub struct InMemoryStore {
    sessions: Arc<RwLock<HashMap<SessionId, ExplorationSession>>>,
    findings: Arc<RwLock<HashMap<FindingId, Finding>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            findings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn finding_count(&self) -> usize {
        self.findings.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned(what: &str) -> anyhow::Error {
    anyhow!("{} store lock poisoned", what)
}

#[async_trait]
impl FindingStore for InMemoryStore {
    async fn save(&self, finding: &Finding) -> Result<()> {
        let mut findings = self.findings.write().map_err(|_| poisoned("finding"))?;
        findings.insert(finding.id, finding.clone());
        Ok(())
    }

    async fn find_by_session_id(&self, session_id: SessionId) -> Result<Vec<Finding>> {
        let findings = self.findings.read().map_err(|_| poisoned("finding"))?;
        let mut found: Vec<Finding> = findings
            .values()
            .filter(|f| f.session_id == session_id)
            .cloned()
            .collect();
        found.sort_by_key(|f| (f.step_number, f.created_at));
        Ok(found)
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn save(&self, session: &ExplorationSession) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned("session"))?;
        sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn get(&self, session_id: SessionId) -> Result<Option<ExplorationSession>> {
        let sessions = self.sessions.read().map_err(|_| poisoned("session"))?;
        Ok(sessions.get(&session_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FindingType, Severity};

    #[tokio::test]
    async fn test_findings_are_scoped_to_session() {
        let store = InMemoryStore::new();
        let session = ExplorationSession::new("https://shop.test", "explore", 5);
        let other = ExplorationSession::new("https://shop.test", "explore", 5);

        let first = Finding::new(
            session.id,
            FindingType::Typo,
            Severity::Low,
            "Typo in footer",
            "https://shop.test",
        )
        .at_step(2);
        let second = Finding::new(
            session.id,
            FindingType::ConsoleError,
            Severity::Medium,
            "Console error on load",
            "https://shop.test",
        )
        .at_step(1);
        let unrelated = Finding::new(
            other.id,
            FindingType::Other,
            Severity::Low,
            "Elsewhere",
            "https://shop.test",
        );

        for finding in [&first, &second, &unrelated] {
            FindingStore::save(&store, finding).await.unwrap();
        }

        let found = store.find_by_session_id(session.id).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, second.id);
        assert_eq!(store.finding_count(), 3);
    }

    #[tokio::test]
    async fn test_session_save_overwrites() {
        let store = InMemoryStore::new();
        let mut session = ExplorationSession::new("https://shop.test", "explore", 5);
        SessionStore::save(&store, &session).await.unwrap();

        session.finish(crate::types::StoppedReason::Completed);
        SessionStore::save(&store, &session).await.unwrap();

        let stored = store.get(session.id).await.unwrap().unwrap();
        assert!(stored.ended_at.is_some());
        assert_eq!(store.session_count(), 1);
    }
}
