use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;

use crate::types::{ActionType, InteractiveElement, PageState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaSuggestion {
    pub persona: String,
    pub action: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub rationale: String,
    pub confidence: f32,
}

#[async_trait]
pub trait PersonaSuggester: Send + Sync {
    fn name(&self) -> &str;
    async fn suggest(&self, page: &PageState) -> Result<Vec<PersonaSuggestion>>;
}

// Asks every persona, drops the ones that fail, and keeps the `limit` most confident ideas.
pub async fn collect_suggestions(
    personas: &[Arc<dyn PersonaSuggester>],
    page: &PageState,
    limit: usize,
) -> Vec<PersonaSuggestion> {
    let results = join_all(personas.iter().map(|p| p.suggest(page))).await;

    let mut suggestions = Vec::new();
    for (persona, result) in personas.iter().zip(results) {
        match result {
            Ok(mut found) => suggestions.append(&mut found),
            Err(e) => log::warn!("persona {} failed on {}: {}", persona.name(), page.url, e),
        }
    }

    suggestions.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
    });
    suggestions.truncate(limit);
    suggestions
}

const INJECTION_PAYLOADS: &[(&str, &str)] = &[
    ("<script>alert(1)</script>", "reflected script injection"),
    ("' OR '1'='1", "SQL injection in a text field"),
    ("../../etc/passwd", "path traversal"),
];

pub struct SecurityProbePersona;

#[async_trait]
impl PersonaSuggester for SecurityProbePersona {
    fn name(&self) -> &str {
        "security"
    }

    async fn suggest(&self, page: &PageState) -> Result<Vec<PersonaSuggestion>> {
        let mut suggestions = Vec::new();
        for input in page.interactive_elements.iter().filter(|e| e.is_text_input()) {
            if input.input_type.as_deref() == Some("password") {
                continue;
            }
            for (payload, what) in INJECTION_PAYLOADS {
                suggestions.push(PersonaSuggestion {
                    persona: self.name().to_string(),
                    action: ActionType::Fill,
                    selector: Some(input.selector.clone()),
                    value: Some(payload.to_string()),
                    rationale: format!("check {} for {}", input.selector, what),
                    confidence: 0.6,
                });
            }
        }
        Ok(suggestions)
    }
}

pub struct EdgeCasePersona;

impl EdgeCasePersona {
    fn values_for(input: &InteractiveElement) -> Vec<(String, &'static str, f32)> {
        match input.input_type.as_deref() {
            Some("email") => vec![
                ("not-an-email".to_string(), "malformed email", 0.7),
                ("a@b".to_string(), "email without a domain suffix", 0.5),
            ],
            Some("tel") => vec![("+00 (000) abc".to_string(), "letters in a phone number", 0.5)],
            Some("url") => vec![("htp:/broken".to_string(), "malformed url", 0.5)],
            _ => vec![
                ("x".repeat(5000), "very long input", 0.55),
                ("   ".to_string(), "whitespace-only input", 0.5),
                ("Zoë 🚀 测试".to_string(), "non-ASCII input", 0.45),
            ],
        }
    }
}

#[async_trait]
impl PersonaSuggester for EdgeCasePersona {
    fn name(&self) -> &str {
        "edge-case"
    }

    async fn suggest(&self, page: &PageState) -> Result<Vec<PersonaSuggestion>> {
        let mut suggestions = Vec::new();
        for element in &page.interactive_elements {
            if element.is_text_input() {
                for (value, what, confidence) in Self::values_for(element) {
                    suggestions.push(PersonaSuggestion {
                        persona: self.name().to_string(),
                        action: ActionType::Fill,
                        selector: Some(element.selector.clone()),
                        value: Some(value),
                        rationale: format!("{} in {}", what, element.selector),
                        confidence,
                    });
                }
            } else if element.tag == "select" {
                suggestions.push(PersonaSuggestion {
                    persona: self.name().to_string(),
                    action: ActionType::Click,
                    selector: Some(element.selector.clone()),
                    value: None,
                    rationale: format!("open {} and look for empty or undefined options", element.selector),
                    confidence: 0.4,
                });
            }
        }
        Ok(suggestions)
    }
}

pub fn default_personas() -> Vec<Arc<dyn PersonaSuggester>> {
    vec![Arc::new(SecurityProbePersona), Arc::new(EdgeCasePersona)]
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Broken;

    #[async_trait]
    impl PersonaSuggester for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn suggest(&self, _page: &PageState) -> Result<Vec<PersonaSuggestion>> {
            anyhow::bail!("persona crashed")
        }
    }

    fn form_page() -> PageState {
        PageState {
            url: "https://shop.test/signup".to_string(),
            interactive_elements: vec![
                InteractiveElement {
                    selector: "#email".to_string(),
                    tag: "input".to_string(),
                    text: String::new(),
                    input_type: Some("email".to_string()),
                    href: None,
                },
                InteractiveElement {
                    selector: "#password".to_string(),
                    tag: "input".to_string(),
                    text: String::new(),
                    input_type: Some("password".to_string()),
                    href: None,
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_security_persona_skips_password_fields() {
        let suggestions = SecurityProbePersona.suggest(&form_page()).await.unwrap();
        assert_eq!(suggestions.len(), INJECTION_PAYLOADS.len());
        assert!(suggestions
            .iter()
            .all(|s| s.selector.as_deref() == Some("#email")));
    }

    #[tokio::test]
    async fn test_collect_sorts_caps_and_ignores_failures() {
        let mut personas = default_personas();
        personas.push(Arc::new(Broken));

        let suggestions = collect_suggestions(&personas, &form_page(), 2).await;
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].value.as_deref(), Some("not-an-email"));
        assert!(suggestions[0].confidence >= suggestions[1].confidence);
    }
}
