use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;

use super::url_key;
use crate::engine::url_discovery::DiscoveredUrl;
use crate::types::Finding;

/// State every agent under one supervisor can see.
///
/// Each resource has its own lock, so marking a page visited never waits on a
/// finding being recorded. No lock is held across an await outside this type.
#[derive(Debug, Default)]
pub struct SharedExplorationState {
    visited: Mutex<HashSet<String>>,
    findings: Mutex<HashMap<String, Finding>>,
    frontier: Mutex<VecDeque<DiscoveredUrl>>,
}

impl SharedExplorationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn mark_visited(&self, url: &str) {
        self.visited.lock().await.insert(url_key(url));
    }

    pub async fn has_visited(&self, url: &str) -> bool {
        self.visited.lock().await.contains(&url_key(url))
    }

    pub async fn visited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.visited.lock().await.iter().cloned().collect();
        urls.sort();
        urls
    }

    // Records `finding` unless one with the same title on the same page exists.
    pub async fn add_finding(&self, finding: Finding) -> bool {
        let key = finding_key(&finding);
        let mut findings = self.findings.lock().await;
        if findings.contains_key(&key) {
            return false;
        }
        findings.insert(key, finding);
        true
    }

    pub async fn get_findings(&self) -> Vec<Finding> {
        let mut findings: Vec<Finding> = self.findings.lock().await.values().cloned().collect();
        findings.sort_by_key(|f| f.created_at);
        findings
    }

    pub async fn get_findings_count(&self) -> usize {
        self.findings.lock().await.len()
    }

    pub async fn add_discovered_url(&self, url: DiscoveredUrl) -> bool {
        if self.has_visited(&url.normalized_url).await {
            return false;
        }
        let key = url_key(&url.normalized_url);
        let mut frontier = self.frontier.lock().await;
        if frontier.iter().any(|u| url_key(&u.normalized_url) == key) {
            return false;
        }
        frontier.push_back(url);
        true
    }

    pub async fn pop_discovered_url(&self) -> Option<DiscoveredUrl> {
        self.frontier.lock().await.pop_front()
    }

    pub async fn frontier_len(&self) -> usize {
        self.frontier.lock().await.len()
    }
}

fn finding_key(finding: &Finding) -> String {
    let digest = Sha256::digest(format!("{}|{}", finding.title, finding.page_url).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::url_discovery::{UrlDiscoveryConfig, UrlDiscoveryService};
    use crate::types::{FindingType, PageLink, Severity};
    use std::sync::Arc;
    use uuid::Uuid;

    fn finding(description: &str, page: &str) -> Finding {
        Finding::new(Uuid::new_v4(), FindingType::Typo, Severity::Low, description, page)
    }

    #[tokio::test]
    async fn test_concurrent_distinct_findings_are_all_kept() {
        let state = Arc::new(SharedExplorationState::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state
                    .add_finding(finding(&format!("Typo number {}", i), "https://shop.test"))
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }
        assert_eq!(state.get_findings_count().await, 20);
    }

    #[tokio::test]
    async fn test_concurrent_identical_findings_keep_one() {
        let state = Arc::new(SharedExplorationState::new());
        let mut handles = Vec::new();
        for _ in 0..20 {
            let state = state.clone();
            handles.push(tokio::spawn(async move {
                state
                    .add_finding(finding("Typo: 'Contakt' instead of 'Contact'", "https://shop.test"))
                    .await
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
        assert_eq!(state.get_findings_count().await, 1);
    }

    #[tokio::test]
    async fn test_visited_ignores_trailing_slash() {
        let state = SharedExplorationState::new();
        state.mark_visited("https://shop.test/cart/").await;
        assert!(state.has_visited("https://shop.test/cart").await);
        assert_eq!(state.visited_urls().await, vec!["https://shop.test/cart"]);
    }

    #[tokio::test]
    async fn test_frontier_skips_visited_and_queued() {
        let mut discovery = UrlDiscoveryService::new(UrlDiscoveryConfig::default()).unwrap();
        discovery.set_base_url("https://shop.test").unwrap();
        let links = vec![
            PageLink {
                href: "/login".to_string(),
                text: "Login".to_string(),
            },
            PageLink {
                href: "/about".to_string(),
                text: "About".to_string(),
            },
        ];
        discovery.add_links(&links, "https://shop.test");
        let urls = discovery.all_urls();

        let state = SharedExplorationState::new();
        state.mark_visited("https://shop.test/about").await;
        for url in &urls {
            state.add_discovered_url(url.clone()).await;
        }
        assert!(!state.add_discovered_url(urls[0].clone()).await);

        assert_eq!(state.frontier_len().await, 1);
        let next = state.pop_discovered_url().await.unwrap();
        assert_eq!(next.normalized_url, "https://shop.test/login");
        assert!(state.pop_discovered_url().await.is_none());
    }
}
