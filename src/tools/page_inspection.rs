use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};

use super::{ExplorationTool, ToolContext, ToolOutput};

static SUSPICIOUS_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:undefined|NaN|null)\b|\[object Object\]").expect("static regex"));

const DEFAULT_LINK_LIMIT: usize = 50;
const SNIPPET_RADIUS: usize = 40;

pub struct ConsoleErrorsTool;

#[async_trait]
impl ExplorationTool for ConsoleErrorsTool {
    fn name(&self) -> &str {
        "console_errors"
    }

    fn description(&self) -> &str {
        "List JavaScript console errors and failed network requests seen on the current page."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, context: &ToolContext<'_>) -> Result<ToolOutput> {
        let mut console = context.page.console_errors.clone();
        for error in context.browser.console_errors() {
            if !console.contains(&error) {
                console.push(error);
            }
        }
        let network = context.page.network_errors.clone();

        let issues = console
            .iter()
            .map(|e| format!("Console error: {}", e))
            .chain(network.iter().map(|e| format!("Network request failed: {}", e)))
            .collect();

        Ok(ToolOutput {
            output: json!({ "console_errors": console, "network_errors": network }),
            issues,
        })
    }
}

pub struct LinkInventoryTool;

#[async_trait]
impl ExplorationTool for LinkInventoryTool {
    fn name(&self) -> &str {
        "link_inventory"
    }

    fn description(&self) -> &str {
        "List the links on the current page and flag ones with empty or placeholder targets."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of links to return (default: 50)"
                }
            }
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext<'_>) -> Result<ToolOutput> {
        let limit = params["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(DEFAULT_LINK_LIMIT);

        let links: Vec<_> = context
            .page
            .interactive_elements
            .iter()
            .filter(|e| e.tag == "a")
            .collect();

        let issues = links
            .iter()
            .filter(|l| {
                let href = l.href.as_deref().unwrap_or("").trim();
                href.is_empty() || href == "#" || href.eq_ignore_ascii_case("javascript:void(0)")
            })
            .map(|l| {
                let label = if l.text.trim().is_empty() { l.selector.as_str() } else { l.text.trim() };
                format!("Link '{}' on {} has no real target", label, context.page.url)
            })
            .collect();

        let listed: Vec<Value> = links
            .iter()
            .take(limit)
            .map(|l| json!({ "text": l.text, "href": l.href }))
            .collect();

        Ok(ToolOutput {
            output: json!({ "total": links.len(), "links": listed }),
            issues,
        })
    }
}

pub struct FindTextTool;

#[async_trait]
impl ExplorationTool for FindTextTool {
    fn name(&self) -> &str {
        "find_text"
    }

    fn description(&self) -> &str {
        "Search the visible page text for a phrase, or for leaked values like undefined and NaN when no phrase is given."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {
                    "type": "string",
                    "description": "Phrase to look for (case-insensitive)"
                }
            }
        })
    }

    async fn execute(&self, params: Value, context: &ToolContext<'_>) -> Result<ToolOutput> {
        let text = &context.page.visible_text;

        if let Some(needle) = params.get("text") {
            let needle = needle
                .as_str()
                .ok_or_else(|| anyhow!("text parameter must be a string"))?
                .to_lowercase();
            let lowered = text.to_lowercase();
            let matches: Vec<String> = lowered
                .match_indices(&needle)
                .map(|(at, _)| snippet(&lowered, at, needle.len()))
                .collect();
            return Ok(ToolOutput {
                output: json!({ "query": needle, "count": matches.len(), "matches": matches }),
                issues: Vec::new(),
            });
        }

        let leaks: Vec<String> = SUSPICIOUS_VALUE
            .find_iter(text)
            .map(|m| snippet(text, m.start(), m.len()))
            .collect();
        let issues = leaks
            .iter()
            .map(|s| format!("Page shows an undefined value: \"{}\"", s))
            .collect();

        Ok(ToolOutput {
            output: json!({ "count": leaks.len(), "matches": leaks }),
            issues,
        })
    }
}

fn snippet(text: &str, at: usize, len: usize) -> String {
    let mut start = at.saturating_sub(SNIPPET_RADIUS);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    let mut end = (at + len + SNIPPET_RADIUS).min(text.len());
    while !text.is_char_boundary(end) {
        end += 1;
    }
    text[start..end].trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::BrowserPort;
    use crate::tools::ToolRegistry;
    use crate::types::{ActionResult, InteractiveElement, PageLink, PageState};

    fn page() -> PageState {
        PageState {
            url: "https://shop.test/cart".to_string(),
            visible_text: "Subtotal: $NaN  Shipping: undefined  Contact us".to_string(),
            interactive_elements: vec![
                InteractiveElement {
                    selector: "a[href=\"#\"]".to_string(),
                    tag: "a".to_string(),
                    text: "Track order".to_string(),
                    input_type: None,
                    href: Some("#".to_string()),
                },
                InteractiveElement {
                    selector: "a[href=\"/faq\"]".to_string(),
                    tag: "a".to_string(),
                    text: "FAQ".to_string(),
                    input_type: None,
                    href: Some("/faq".to_string()),
                },
            ],
            console_errors: vec!["TypeError: x is undefined".to_string()],
            network_errors: vec!["GET /api/cart -> 500".to_string()],
            ..Default::default()
        }
    }

    struct NullBrowser;

    #[async_trait]
    impl BrowserPort for NullBrowser {
        async fn initialize(&self) -> Result<()> {
            Ok(())
        }
        async fn close(&self) -> Result<()> {
            Ok(())
        }
        async fn navigate(&self, _url: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn click(&self, _selector: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn fill(&self, _selector: &str, _value: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn select(&self, _selector: &str, _value: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn hover(&self, _selector: &str) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn go_back(&self) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn refresh(&self) -> Result<ActionResult> {
            Ok(ActionResult::ok(0))
        }
        async fn evaluate(&self, _script: &str) -> Result<Value> {
            Ok(Value::Null)
        }
        async fn extract_page_state(&self) -> Result<PageState> {
            Ok(PageState::default())
        }
        async fn extract_links(&self) -> Result<Vec<PageLink>> {
            Ok(vec![])
        }
        async fn get_current_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn get_title(&self) -> Result<String> {
            Ok(String::new())
        }
        fn console_errors(&self) -> Vec<String> {
            vec!["TypeError: x is undefined".to_string()]
        }
    }

    #[tokio::test]
    async fn test_registry_lists_defaults() {
        let registry = ToolRegistry::with_defaults();
        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["console_errors", "find_text", "link_inventory"]);
    }

    #[tokio::test]
    async fn test_tools_report_issues() {
        let registry = ToolRegistry::with_defaults();
        let page = page();
        let browser = NullBrowser;
        let ctx = ToolContext {
            page: &page,
            browser: &browser,
        };

        let console = registry.execute("console_errors", json!({}), &ctx).await.unwrap();
        assert_eq!(console.issues.len(), 2);

        let links = registry.execute("link_inventory", json!({}), &ctx).await.unwrap();
        assert_eq!(links.output["total"], 2);
        assert_eq!(
            links.issues,
            vec!["Link 'Track order' on https://shop.test/cart has no real target".to_string()]
        );

        let leaks = registry.execute("find_text", json!({}), &ctx).await.unwrap();
        assert_eq!(leaks.issues.len(), 2);

        let search = registry
            .execute("find_text", json!({"text": "CONTACT"}), &ctx)
            .await
            .unwrap();
        assert_eq!(search.output["count"], 1);
        assert!(search.issues.is_empty());

        assert!(registry.execute("teleport", json!({}), &ctx).await.is_err());
    }
}
