use serde::{Deserialize, Serialize};

const MAX_CONTEXT_TEXT: usize = 2000;
const MAX_CONTEXT_ELEMENTS: usize = 40;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub visible_text: String,
    pub interactive_elements: Vec<InteractiveElement>,
    pub console_errors: Vec<String>,
    pub network_errors: Vec<String>,
    #[serde(default)]
    pub links: Vec<PageLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub selector: String,
    pub tag: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

impl InteractiveElement {
    pub fn is_text_input(&self) -> bool {
        match self.tag.as_str() {
            "textarea" => true,
            "input" => matches!(
                self.input_type.as_deref().unwrap_or("text"),
                "text" | "search" | "email" | "password" | "tel" | "url"
            ),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLink {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

// The compact projection of a page that is handed to the decision oracle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmPageContext {
    pub url: String,
    pub title: String,
    pub text_excerpt: String,
    pub elements: Vec<String>,
    pub console_errors: Vec<String>,
    pub network_errors: Vec<String>,
}

impl LlmPageContext {
    pub fn from_page(page: &PageState) -> Self {
        let text_excerpt: String = page.visible_text.chars().take(MAX_CONTEXT_TEXT).collect();
        let elements = page
            .interactive_elements
            .iter()
            .take(MAX_CONTEXT_ELEMENTS)
            .map(|el| {
                let label = el.text.trim();
                match (&el.href, label.is_empty()) {
                    (Some(href), _) => format!("{} \"{}\" -> {}", el.selector, label, href),
                    (None, true) => el.selector.clone(),
                    (None, false) => format!("{} \"{}\"", el.selector, label),
                }
            })
            .collect();

        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            text_excerpt,
            elements,
            console_errors: page.console_errors.clone(),
            network_errors: page.network_errors.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_truncates_text_and_elements() {
        let page = PageState {
            url: "https://shop.test".to_string(),
            title: "Shop".to_string(),
            visible_text: "x".repeat(5000),
            interactive_elements: (0..100)
                .map(|i| InteractiveElement {
                    selector: format!("#el-{}", i),
                    tag: "button".to_string(),
                    text: String::new(),
                    input_type: None,
                    href: None,
                })
                .collect(),
            ..Default::default()
        };

        let ctx = LlmPageContext::from_page(&page);
        assert_eq!(ctx.text_excerpt.len(), MAX_CONTEXT_TEXT);
        assert_eq!(ctx.elements.len(), MAX_CONTEXT_ELEMENTS);
        assert_eq!(ctx.elements[0], "#el-0");
    }

    #[test]
    fn test_text_input_detection() {
        let input = InteractiveElement {
            selector: "input[name=\"q\"]".to_string(),
            tag: "input".to_string(),
            text: String::new(),
            input_type: None,
            href: None,
        };
        assert!(input.is_text_input());

        let checkbox = InteractiveElement {
            input_type: Some("checkbox".to_string()),
            ..input
        };
        assert!(!checkbox.is_text_input());
    }
}
