use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use url::Url;

use super::browser::{BrowserFactory, BrowserPort};
use crate::config::BrowserConfig;
use crate::error::ExplorationError;
use crate::types::{ActionResult, InteractiveElement, PageLink, PageState};

static SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").expect("static regex"));
static STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("static regex"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("static regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));
static TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"));
static ANCHOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<a\b([^>]*)>(.*?)</a>").expect("static regex"));
static BUTTON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<button\b([^>]*)>(.*?)</button>").expect("static regex"));
static FORM_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<(input|select|textarea)\b([^>]*)>").expect("static regex"));
static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b([a-z][a-z0-9_-]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("static regex")
});
static HREF_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^a\[href="(.*)"\]$"#).expect("static regex"));

const MAX_ELEMENTS: usize = 200;

#[derive(Debug, Default)]
struct LoadedPage {
    url: String,
    status: u16,
    html: String,
    elements: Vec<InteractiveElement>,
}

#[derive(Debug, Default)]
struct BrowserState {
    page: Option<LoadedPage>,
    history: Vec<String>,
    network_errors: Vec<String>,
}

/// A browser that fetches pages over HTTP and reads their static HTML.
///
/// Scripts never run, so clicks only follow links and form input is accepted
/// without effect. Good enough for crawling server-rendered sites.
pub struct HttpBrowser {
    client: reqwest::Client,
    state: Mutex<BrowserState>,
}

impl HttpBrowser {
    pub fn new(config: &BrowserConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.step_timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self {
            client,
            state: Mutex::new(BrowserState::default()),
        })
    }

    fn state(&self) -> std::sync::MutexGuard<'_, BrowserState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_url(&self) -> Option<String> {
        self.state().page.as_ref().map(|p| p.url.clone())
    }

    async fn load(&self, url: &str, push_history: bool) -> Result<ActionResult> {
        let started = Instant::now();
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                return Ok(ActionResult::failed(
                    format!("request to {} failed: {}", url, e),
                    elapsed_ms(started),
                ))
            }
        };

        let status = response.status();
        let final_url = response.url().to_string();
        let html = response
            .text()
            .await
            .map_err(|e| ExplorationError::Browser(format!("reading body of {}: {}", url, e)))?;
        let elements = extract_elements(&html);

        let mut state = self.state();
        if push_history {
            if let Some(previous) = state.page.as_ref().map(|p| p.url.clone()) {
                state.history.push(previous);
            }
        }
        if !status.is_success() {
            state
                .network_errors
                .push(format!("GET {} -> {}", final_url, status.as_u16()));
        }
        state.page = Some(LoadedPage {
            url: final_url,
            status: status.as_u16(),
            html,
            elements,
        });

        let duration = elapsed_ms(started);
        if status.is_success() {
            Ok(ActionResult::ok(duration))
        } else {
            Ok(ActionResult::failed(format!("HTTP {}", status.as_u16()), duration))
        }
    }

    fn find_element(&self, selector: &str) -> Option<InteractiveElement> {
        self.state()
            .page
            .as_ref()
            .and_then(|p| p.elements.iter().find(|e| e.selector == selector).cloned())
    }

    fn resolve(&self, href: &str) -> Result<String> {
        let current = self
            .current_url()
            .ok_or_else(|| ExplorationError::Browser("no page loaded".to_string()))?;
        let base = Url::parse(&current)?;
        Ok(base.join(href)?.to_string())
    }
}

#[async_trait]
impl BrowserPort for HttpBrowser {
    async fn initialize(&self) -> Result<()> {
        *self.state() = BrowserState::default();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        *self.state() = BrowserState::default();
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<ActionResult> {
        let target = if self.current_url().is_some() {
            self.resolve(url)?
        } else {
            url.to_string()
        };
        self.load(&target, true).await
    }

    async fn click(&self, selector: &str) -> Result<ActionResult> {
        let href = match self.find_element(selector) {
            Some(element) => element.href,
            None => HREF_SELECTOR
                .captures(selector)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
        };

        match href {
            Some(href) => {
                let target = self.resolve(&href)?;
                self.load(&target, true).await
            }
            None if self.find_element(selector).is_some() => Ok(ActionResult::ok(0)),
            None => Ok(ActionResult::failed(
                format!("no element matches selector {}", selector),
                0,
            )),
        }
    }

    async fn fill(&self, selector: &str, _value: &str) -> Result<ActionResult> {
        self.field_interaction(selector)
    }

    async fn select(&self, selector: &str, _value: &str) -> Result<ActionResult> {
        self.field_interaction(selector)
    }

    async fn hover(&self, selector: &str) -> Result<ActionResult> {
        self.field_interaction(selector)
    }

    async fn go_back(&self) -> Result<ActionResult> {
        let previous = self.state().history.pop();
        match previous {
            Some(url) => self.load(&url, false).await,
            None => Ok(ActionResult::failed("no history to go back to", 0)),
        }
    }

    async fn refresh(&self) -> Result<ActionResult> {
        match self.current_url() {
            Some(url) => self.load(&url, false).await,
            None => Ok(ActionResult::failed("no page loaded", 0)),
        }
    }

    async fn evaluate(&self, _script: &str) -> Result<Value> {
        Err(ExplorationError::Unsupported("script evaluation needs a scripting browser".to_string()).into())
    }

    async fn extract_page_state(&self) -> Result<PageState> {
        let state = self.state();
        let page = state
            .page
            .as_ref()
            .ok_or_else(|| ExplorationError::PageExtraction("no page loaded".to_string()))?;

        Ok(PageState {
            url: page.url.clone(),
            title: extract_title(&page.html),
            visible_text: extract_text_from_html(&page.html),
            interactive_elements: page.elements.clone(),
            console_errors: Vec::new(),
            network_errors: state.network_errors.clone(),
            links: extract_links(&page.html),
        })
    }

    async fn extract_links(&self) -> Result<Vec<PageLink>> {
        let state = self.state();
        let page = state
            .page
            .as_ref()
            .ok_or_else(|| ExplorationError::PageExtraction("no page loaded".to_string()))?;
        Ok(extract_links(&page.html))
    }

    async fn get_current_url(&self) -> Result<String> {
        self.current_url()
            .ok_or_else(|| anyhow!(ExplorationError::Browser("no page loaded".to_string())))
    }

    async fn get_title(&self) -> Result<String> {
        Ok(self
            .state()
            .page
            .as_ref()
            .map(|p| extract_title(&p.html))
            .unwrap_or_default())
    }

    fn console_errors(&self) -> Vec<String> {
        Vec::new()
    }
}

impl HttpBrowser {
    fn field_interaction(&self, selector: &str) -> Result<ActionResult> {
        let status = self.state().page.as_ref().map(|p| p.status);
        if status.is_none() {
            return Ok(ActionResult::failed("no page loaded", 0));
        }
        if self.find_element(selector).is_some() {
            Ok(ActionResult::ok(0))
        } else {
            Ok(ActionResult::failed(
                format!("no element matches selector {}", selector),
                0,
            ))
        }
    }
}

pub struct HttpBrowserFactory {
    config: BrowserConfig,
}

impl HttpBrowserFactory {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl BrowserFactory for HttpBrowserFactory {
    async fn create(&self) -> Result<Arc<dyn BrowserPort>> {
        Ok(Arc::new(HttpBrowser::new(&self.config)?))
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn attributes(raw: &str) -> Vec<(String, String)> {
    ATTRIBUTE
        .captures_iter(raw)
        .map(|c| {
            let value = c.get(2).or_else(|| c.get(3)).map(|m| m.as_str()).unwrap_or("");
            (c[1].to_lowercase(), html_escape::decode_html_entities(value).to_string())
        })
        .collect()
}

fn attribute<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn inner_text(html: &str) -> String {
    let text = TAG.replace_all(html, " ");
    let text = html_escape::decode_html_entities(&text).to_string();
    WHITESPACE.replace_all(&text, " ").trim().to_string()
}

pub fn extract_text_from_html(html: &str) -> String {
    let text = SCRIPT.replace_all(html, "");
    let text = STYLE.replace_all(&text, "");
    inner_text(&text)
}

fn extract_title(html: &str) -> String {
    TITLE
        .captures(html)
        .map(|c| inner_text(&c[1]))
        .unwrap_or_default()
}

fn extract_links(html: &str) -> Vec<PageLink> {
    ANCHOR
        .captures_iter(html)
        .filter_map(|c| {
            let attrs = attributes(&c[1]);
            attribute(&attrs, "href").map(|href| PageLink {
                href: href.to_string(),
                text: inner_text(&c[2]),
            })
        })
        .collect()
}

fn extract_elements(html: &str) -> Vec<InteractiveElement> {
    let mut elements = Vec::new();

    for c in ANCHOR.captures_iter(html) {
        let attrs = attributes(&c[1]);
        if let Some(href) = attribute(&attrs, "href") {
            elements.push(InteractiveElement {
                selector: format!("a[href=\"{}\"]", href),
                tag: "a".to_string(),
                text: inner_text(&c[2]),
                input_type: None,
                href: Some(href.to_string()),
            });
        }
    }

    for (index, c) in BUTTON.captures_iter(html).enumerate() {
        let attrs = attributes(&c[1]);
        let selector = match attribute(&attrs, "id") {
            Some(id) => format!("#{}", id),
            None => format!("button:nth-of-type({})", index + 1),
        };
        elements.push(InteractiveElement {
            selector,
            tag: "button".to_string(),
            text: inner_text(&c[2]),
            input_type: attribute(&attrs, "type").map(str::to_string),
            href: None,
        });
    }

    for c in FORM_FIELD.captures_iter(html) {
        let tag = c[1].to_lowercase();
        let attrs = attributes(&c[2]);
        let input_type = attribute(&attrs, "type").map(str::to_lowercase);
        if input_type.as_deref() == Some("hidden") {
            continue;
        }
        let selector = match (attribute(&attrs, "id"), attribute(&attrs, "name")) {
            (Some(id), _) => format!("#{}", id),
            (None, Some(name)) => format!("{}[name=\"{}\"]", tag, name),
            (None, None) => continue,
        };
        elements.push(InteractiveElement {
            selector,
            text: attribute(&attrs, "placeholder").unwrap_or("").to_string(),
            tag,
            input_type,
            href: None,
        });
    }

    elements.truncate(MAX_ELEMENTS);
    elements
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html>
            <head><title>Shop &amp; More</title><style>.x { color: red; }</style></head>
            <body>
                <script>console.log('ignore');</script>
                <h1>Welcome</h1>
                <a href="/login">Sign in</a>
                <a class="nav" href='/products?page=2'>More <b>products</b></a>
                <button id="subscribe">Subscribe</button>
                <form>
                    <input type="hidden" name="csrf" value="x">
                    <input type="email" name="email" placeholder="you@example.com">
                    <select id="country"></select>
                </form>
            </body>
        </html>
    "#;

    #[test]
    fn test_extract_text_from_html() {
        let text = extract_text_from_html(PAGE);
        assert!(text.contains("Welcome"));
        assert!(text.contains("More products"));
        assert!(!text.contains("console.log"));
        assert!(!text.contains("color: red"));
    }

    #[test]
    fn test_title_is_decoded() {
        assert_eq!(extract_title(PAGE), "Shop & More");
    }

    #[test]
    fn test_links_and_elements() {
        let links = extract_links(PAGE);
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].href, "/products?page=2");
        assert_eq!(links[1].text, "More products");

        let elements = extract_elements(PAGE);
        let selectors: Vec<&str> = elements.iter().map(|e| e.selector.as_str()).collect();
        assert_eq!(
            selectors,
            vec![
                "a[href=\"/login\"]",
                "a[href=\"/products?page=2\"]",
                "#subscribe",
                "input[name=\"email\"]",
                "#country",
            ]
        );
        assert!(elements[3].is_text_input());
    }

    #[tokio::test]
    async fn test_extraction_before_navigation_fails() {
        let browser = HttpBrowser::new(&BrowserConfig::default()).unwrap();
        let err = browser.extract_page_state().await.unwrap_err();
        assert!(matches!(
            crate::error::classify(&err),
            Some(ExplorationError::PageExtraction(_))
        ));
        assert!(browser.console_errors().is_empty());
    }
}
