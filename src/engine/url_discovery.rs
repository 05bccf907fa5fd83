use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

use crate::error::ExplorationError;
use crate::types::{PageLink, UrlCategory};

const MAX_LINK_TEXT: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UrlDiscoveryConfig {
    pub same_origin_only: bool,
    pub max_queue_size: usize,
    // Extra regexes (matched against path, query and fragment) that earn priority 30.
    pub custom_priority_patterns: Vec<String>,
}

impl Default for UrlDiscoveryConfig {
    fn default() -> Self {
        Self {
            same_origin_only: true,
            max_queue_size: 100,
            custom_priority_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlPriority {
    High,
    Medium,
    Low,
}

impl UrlPriority {
    fn from_score(score: u32) -> Self {
        match score {
            0..=25 => UrlPriority::High,
            26..=50 => UrlPriority::Medium,
            _ => UrlPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredUrl {
    pub url: String,
    pub normalized_url: String,
    pub category: UrlCategory,
    pub link_text: String,
    pub priority: UrlPriority,
    // Lower is more urgent.
    pub priority_score: u32,
    pub visited: bool,
    pub discovered_at: DateTime<Utc>,
    #[serde(default)]
    pub sequence: u64,
}

#[async_trait]
pub trait PageScanner: Send + Sync {
    async fn scan_links(&self) -> Result<Vec<PageLink>>;
}

static EXCLUDED_SCHEME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(mailto:|tel:|javascript:|data:|sms:|ftp:)").expect("static regex")
});
static STATIC_ASSET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\.(css|js|mjs|map|png|jpe?g|gif|svg|ico|webp|avif|pdf|zip|gz|woff2?|ttf|eot|mp4|mp3|webm|xml|json)$",
    )
    .expect("static regex")
});
static API_OR_LOGOUT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|/)(api|graphql)(/|$)|log-?out|sign-?out").expect("static regex")
});

static CATEGORY_PATTERNS: Lazy<Vec<(UrlCategory, Regex)>> = Lazy::new(|| {
    [
        (
            UrlCategory::Auth,
            r"(login|log-in|signin|sign-in|signup|sign-up|register|auth|forgot|reset-password)",
        ),
        (
            UrlCategory::User,
            r"(account|profile|user|settings|dashboard|orders|wishlist|my-)",
        ),
        (
            UrlCategory::Product,
            r"(product|item|catalog|shop|categor|search|collection|store)",
        ),
        (UrlCategory::Cart, r"(cart|basket|checkout|bag)"),
        (UrlCategory::Admin, r"(admin|manage|backoffice|cms)"),
        (
            UrlCategory::Info,
            r"(about|contact|faq|help|support|terms|privacy|policy|blog|news|legal)",
        ),
    ]
    .into_iter()
    .map(|(category, pattern)| (category, Regex::new(pattern).expect("static regex")))
    .collect()
});

static SIGNUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(signup|sign-up|register)").expect("static regex"));
static LOGIN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(login|log-in|signin|sign-in)").expect("static regex"));
static CONTACT: Lazy<Regex> = Lazy::new(|| Regex::new(r"contact").expect("static regex"));
static ABOUT: Lazy<Regex> = Lazy::new(|| Regex::new(r"about").expect("static regex"));
static SUPPORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(faq|help|support)").expect("static regex"));
static LOW_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(terms|privacy|blog|news)").expect("static regex"));

/// Collects outbound links into a prioritized frontier keyed by normalized URL.
pub struct UrlDiscoveryService {
    config: UrlDiscoveryConfig,
    custom_patterns: Vec<Regex>,
    base: Option<Url>,
    urls: HashMap<String, DiscoveredUrl>,
    next_sequence: u64,
}

impl UrlDiscoveryService {
    pub fn new(config: UrlDiscoveryConfig) -> Result<Self> {
        let custom_patterns = config
            .custom_priority_patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("(?i){}", p)).map_err(|e| {
                    ExplorationError::config(format!("invalid custom priority pattern '{}': {}", p, e))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            config,
            custom_patterns,
            base: None,
            urls: HashMap::new(),
            next_sequence: 0,
        })
    }

    pub fn set_base_url(&mut self, base_url: &str) -> Result<()> {
        let base = Url::parse(base_url)
            .map_err(|e| ExplorationError::config(format!("invalid base url '{}': {}", base_url, e)))?;
        self.base = Some(base);
        Ok(())
    }

    pub async fn scan_page<S: PageScanner + ?Sized>(
        &mut self,
        scanner: &S,
        page_url: &str,
    ) -> Result<usize> {
        let links = scanner.scan_links().await?;
        Ok(self.add_links(&links, page_url))
    }

    pub fn add_links(&mut self, links: &[PageLink], page_url: &str) -> usize {
        let page = match Url::parse(page_url) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("cannot resolve links against '{}': {}", page_url, e);
                return 0;
            }
        };
        if self.base.is_none() {
            self.base = Some(page.clone());
        }

        let mut added = 0;
        for link in links {
            if self.urls.len() >= self.config.max_queue_size {
                log::debug!(
                    "url frontier full ({} entries), ignoring remaining links",
                    self.config.max_queue_size
                );
                break;
            }
            if self.add_link(link, &page) {
                added += 1;
            }
        }
        added
    }

    fn add_link(&mut self, link: &PageLink, page: &Url) -> bool {
        if EXCLUDED_SCHEME.is_match(&link.href) {
            return false;
        }
        let resolved = match resolve(&link.href, page) {
            Some(url) => url,
            None => return false,
        };
        if self.config.same_origin_only {
            let base = self.base.as_ref().unwrap_or(page);
            if resolved.origin() != base.origin() {
                return false;
            }
        }

        let route = route_of(&resolved);
        if STATIC_ASSET.is_match(resolved.path()) || API_OR_LOGOUT.is_match(&route) {
            return false;
        }

        let normalized = serialize_normalized(&resolved);
        if self.urls.contains_key(&normalized) {
            return false;
        }

        let score = self.priority_for(&resolved);
        let entry = DiscoveredUrl {
            url: link.href.clone(),
            normalized_url: normalized.clone(),
            category: categorize_route(&route),
            link_text: link.text.trim().chars().take(MAX_LINK_TEXT).collect(),
            priority: UrlPriority::from_score(score),
            priority_score: score,
            visited: false,
            discovered_at: Utc::now(),
            sequence: self.bump_sequence(),
        };
        self.urls.insert(normalized, entry);
        true
    }

    fn bump_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    pub fn normalize(&self, url: &str) -> Option<String> {
        let base = self.base.as_ref();
        let resolved = match base {
            Some(base) => resolve(url, base)?,
            None => Url::parse(url).ok()?,
        };
        Some(serialize_normalized(&resolved))
    }

    pub fn mark_visited(&mut self, url: &str) {
        let normalized = match self.normalize(url) {
            Some(n) => n,
            None => return,
        };
        if let Some(entry) = self.urls.get_mut(&normalized) {
            entry.visited = true;
            return;
        }

        // Remember pages we reached without a link so they are never queued later.
        if let Ok(resolved) = Url::parse(&normalized) {
            let score = self.priority_for(&resolved);
            let sequence = self.bump_sequence();
            self.urls.insert(
                normalized.clone(),
                DiscoveredUrl {
                    url: url.to_string(),
                    normalized_url: normalized,
                    category: categorize_route(&route_of(&resolved)),
                    link_text: String::new(),
                    priority: UrlPriority::from_score(score),
                    priority_score: score,
                    visited: true,
                    discovered_at: Utc::now(),
                    sequence,
                },
            );
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.normalize(url)
            .and_then(|n| self.urls.get(&n))
            .map(|e| e.visited)
            .unwrap_or(false)
    }

    // Unvisited URLs, most urgent first; earlier discoveries win ties.
    pub fn get_unvisited_urls(&self) -> Vec<DiscoveredUrl> {
        let mut unvisited: Vec<DiscoveredUrl> =
            self.urls.values().filter(|u| !u.visited).cloned().collect();
        unvisited.sort_by(|a, b| {
            a.priority_score
                .cmp(&b.priority_score)
                .then(a.discovered_at.cmp(&b.discovered_at))
                .then(a.sequence.cmp(&b.sequence))
        });
        unvisited
    }

    pub fn next_by_category(&self) -> Option<DiscoveredUrl> {
        self.get_unvisited_urls()
            .into_iter()
            .min_by_key(|u| (u.category.exit_rank(), u.priority_score, u.sequence))
    }

    pub fn all_urls(&self) -> Vec<DiscoveredUrl> {
        let mut all: Vec<DiscoveredUrl> = self.urls.values().cloned().collect();
        all.sort_by_key(|u| u.sequence);
        all
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn clear(&mut self) {
        self.urls.clear();
        self.next_sequence = 0;
    }

    fn priority_for(&self, url: &Url) -> u32 {
        let route = route_of(url);

        if SIGNUP.is_match(&route) {
            5
        } else if LOGIN.is_match(&route) {
            15
        } else if is_site_root(url) {
            25
        } else if self.custom_patterns.iter().any(|p| p.is_match(&route)) {
            30
        } else if category_matches(UrlCategory::Product, &route) {
            35
        } else if category_matches(UrlCategory::Cart, &route) {
            40
        } else if category_matches(UrlCategory::User, &route) {
            45
        } else if CONTACT.is_match(&route) {
            65
        } else if ABOUT.is_match(&route) {
            75
        } else if SUPPORT.is_match(&route) {
            80
        } else if LOW_VALUE.is_match(&route) {
            85
        } else {
            50
        }
    }
}

pub fn categorize(url: &str) -> UrlCategory {
    match Url::parse(url) {
        Ok(parsed) => categorize_route(&route_of(&parsed)),
        Err(_) => categorize_route(&url.to_lowercase()),
    }
}

fn categorize_route(route: &str) -> UrlCategory {
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(route))
        .map(|(category, _)| *category)
        .unwrap_or(UrlCategory::Other)
}

fn category_matches(category: UrlCategory, route: &str) -> bool {
    CATEGORY_PATTERNS
        .iter()
        .any(|(c, pattern)| *c == category && pattern.is_match(route))
}

fn resolve(href: &str, page: &Url) -> Option<Url> {
    let mut resolved = page.join(href.trim()).ok()?;
    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }
    let keep_fragment = resolved
        .fragment()
        .map(|f| f.starts_with('/'))
        .unwrap_or(false);
    if !keep_fragment {
        resolved.set_fragment(None);
    }
    Some(resolved)
}

// Lower-cased path, query and fragment: the part of a URL the rules look at.
fn route_of(url: &Url) -> String {
    let mut route = url.path().to_string();
    if let Some(query) = url.query() {
        route.push('?');
        route.push_str(query);
    }
    if let Some(fragment) = url.fragment() {
        route.push('#');
        route.push_str(fragment);
    }
    route.to_lowercase()
}

fn is_site_root(url: &Url) -> bool {
    let path_is_root = url.path() == "/" || url.path().is_empty();
    let fragment_is_root = matches!(url.fragment(), None | Some("") | Some("/"));
    path_is_root && fragment_is_root && url.query().is_none()
}

fn serialize_normalized(url: &Url) -> String {
    let serialized = url.to_string();
    match serialized.strip_suffix('/') {
        Some(stripped) => stripped.to_string(),
        None => serialized,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(hrefs: &[&str]) -> Vec<PageLink> {
        hrefs
            .iter()
            .map(|h| PageLink {
                href: h.to_string(),
                text: format!("link {}", h),
            })
            .collect()
    }

    fn service() -> UrlDiscoveryService {
        UrlDiscoveryService::new(UrlDiscoveryConfig::default()).unwrap()
    }

    #[test]
    fn test_priority_scores_are_deterministic() {
        let mut discovery = service();
        let added = discovery.add_links(
            &links(&["/signup", "/login", "/", "/contact", "/about"]),
            "https://shop.test/home",
        );
        assert_eq!(added, 5);

        let unvisited = discovery.get_unvisited_urls();
        let scores: Vec<u32> = unvisited.iter().map(|u| u.priority_score).collect();
        assert_eq!(scores, vec![5, 15, 25, 65, 75]);

        let urls: Vec<&str> = unvisited.iter().map(|u| u.normalized_url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://shop.test/signup",
                "https://shop.test/login",
                "https://shop.test",
                "https://shop.test/contact",
                "https://shop.test/about",
            ]
        );
    }

    #[test]
    fn test_rule_cascade() {
        let mut discovery = UrlDiscoveryService::new(UrlDiscoveryConfig {
            custom_priority_patterns: vec!["/deals".to_string()],
            ..Default::default()
        })
        .unwrap();
        discovery.add_links(
            &links(&[
                "/deals/today",
                "/products/1",
                "/cart",
                "/account",
                "/faq",
                "/privacy",
                "/random",
                "/#/",
            ]),
            "https://shop.test/",
        );

        let score = |path: &str| {
            discovery
                .all_urls()
                .into_iter()
                .find(|u| u.normalized_url == format!("https://shop.test{}", path))
                .map(|u| u.priority_score)
        };
        assert_eq!(score("/deals/today"), Some(30));
        assert_eq!(score("/products/1"), Some(35));
        assert_eq!(score("/cart"), Some(40));
        assert_eq!(score("/account"), Some(45));
        assert_eq!(score("/faq"), Some(80));
        assert_eq!(score("/privacy"), Some(85));
        assert_eq!(score("/random"), Some(50));
        assert_eq!(score("/#"), Some(25));
    }

    #[test]
    fn test_normalization_and_identity() {
        let mut discovery = service();
        let added = discovery.add_links(
            &links(&[
                "/products/",
                "/products#reviews",
                "https://shop.test/products",
                "/#/checkout/",
                "/#/checkout",
            ]),
            "https://shop.test/",
        );
        assert_eq!(added, 2);

        let urls: Vec<String> = discovery
            .all_urls()
            .into_iter()
            .map(|u| u.normalized_url)
            .collect();
        assert_eq!(
            urls,
            vec!["https://shop.test/products", "https://shop.test/#/checkout"]
        );
    }

    #[test]
    fn test_exclusions() {
        let mut discovery = service();
        let added = discovery.add_links(
            &links(&[
                "mailto:help@shop.test",
                "tel:+123",
                "javascript:void(0)",
                "/static/app.css",
                "/img/logo.png",
                "/api/products",
                "/logout",
                "https://elsewhere.test/products",
                "/products",
            ]),
            "https://shop.test/",
        );
        assert_eq!(added, 1);
        assert_eq!(discovery.len(), 1);
    }

    #[test]
    fn test_cross_origin_allowed_when_configured() {
        let mut discovery = UrlDiscoveryService::new(UrlDiscoveryConfig {
            same_origin_only: false,
            ..Default::default()
        })
        .unwrap();
        let added = discovery.add_links(
            &links(&["https://elsewhere.test/products"]),
            "https://shop.test/",
        );
        assert_eq!(added, 1);
    }

    #[test]
    fn test_queue_size_cap() {
        let mut discovery = UrlDiscoveryService::new(UrlDiscoveryConfig {
            max_queue_size: 3,
            ..Default::default()
        })
        .unwrap();
        let hrefs: Vec<String> = (0..10).map(|i| format!("/products/{}", i)).collect();
        let refs: Vec<&str> = hrefs.iter().map(|s| s.as_str()).collect();
        assert_eq!(discovery.add_links(&links(&refs), "https://shop.test/"), 3);
        assert_eq!(discovery.len(), 3);
    }

    #[test]
    fn test_mark_visited_and_rediscovery() {
        let mut discovery = service();
        discovery.add_links(&links(&["/login", "/products"]), "https://shop.test/");
        discovery.mark_visited("https://shop.test/login/");
        assert!(discovery.is_visited("https://shop.test/login"));

        let unvisited = discovery.get_unvisited_urls();
        assert_eq!(unvisited.len(), 1);
        assert_eq!(unvisited[0].normalized_url, "https://shop.test/products");

        discovery.mark_visited("https://shop.test/cart");
        assert_eq!(discovery.add_links(&links(&["/cart"]), "https://shop.test/"), 0);
        assert_eq!(discovery.get_unvisited_urls().len(), 1);
    }

    #[test]
    fn test_categories() {
        assert_eq!(categorize("https://shop.test/login"), UrlCategory::Auth);
        assert_eq!(categorize("https://shop.test/account/orders"), UrlCategory::User);
        assert_eq!(categorize("https://shop.test/products/7"), UrlCategory::Product);
        assert_eq!(categorize("https://shop.test/checkout"), UrlCategory::Cart);
        assert_eq!(categorize("https://shop.test/admin"), UrlCategory::Admin);
        assert_eq!(categorize("https://shop.test/about"), UrlCategory::Info);
        assert_eq!(categorize("https://shop.test/"), UrlCategory::Other);
    }

    #[test]
    fn test_next_by_category_prefers_auth_then_product() {
        let mut discovery = service();
        discovery.add_links(
            &links(&["/about", "/cart", "/products", "/login"]),
            "https://shop.test/",
        );
        assert_eq!(
            discovery.next_by_category().unwrap().normalized_url,
            "https://shop.test/login"
        );
        discovery.mark_visited("https://shop.test/login");
        assert_eq!(
            discovery.next_by_category().unwrap().normalized_url,
            "https://shop.test/products"
        );
    }

    struct StaticScanner(Vec<PageLink>);

    #[async_trait]
    impl PageScanner for StaticScanner {
        async fn scan_links(&self) -> Result<Vec<PageLink>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_scan_page_uses_scanner_links() {
        let mut discovery = service();
        let scanner = StaticScanner(links(&["/products", "/products/"]));
        let added = discovery
            .scan_page(&scanner, "https://shop.test/")
            .await
            .unwrap();
        assert_eq!(added, 1);
    }

    #[test]
    fn test_invalid_custom_pattern_is_config_error() {
        let result = UrlDiscoveryService::new(UrlDiscoveryConfig {
            custom_priority_patterns: vec!["(".to_string()],
            ..Default::default()
        });
        assert!(result.is_err());
    }
}
