use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use url::Url;

use crate::types::{Finding, FindingId, FindingType, Severity};

const MAX_KEYWORDS: usize = 10;
const GENERIC_KEY_KEYWORDS: usize = 5;
const MAX_CONSOLE_KEY: usize = 60;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "with", "this", "that", "from", "was", "were", "has",
    "have", "had", "when", "which", "while", "there", "their", "they", "them", "then", "than",
    "into", "onto", "its", "can", "could", "would", "should", "will", "been", "being", "also",
    "only", "very", "just", "some", "any", "all", "you", "your", "our", "out", "too", "via",
    "per", "after", "before", "upon", "does", "did", "doing", "instead", "page", "appears",
    "seems", "shown", "where", "what", "who", "how",
];

// Keyword families used when no extraction pattern matches. Checked top to bottom;
// the order decides ties, e.g. a typo report that says "error" stays a typo.
const TYPE_KEYWORDS: &[(FindingType, &[&str])] = &[
    (FindingType::Typo, &["typo", "misspell", "spelling", "grammar"]),
    (
        FindingType::UndefinedValue,
        &["undefined", "null", "nan", "[object object]"],
    ),
    (
        FindingType::DropdownError,
        &["dropdown", "drop-down", "select box", "select menu"],
    ),
    (
        FindingType::ConsoleError,
        &["console", "uncaught", "exception", "stack trace"],
    ),
    (
        FindingType::BrokenImage,
        &["broken image", "image not", "missing image", "img"],
    ),
    (
        FindingType::ValidationError,
        &["validation", "invalid", "required field", "accepts"],
    ),
    (
        FindingType::FunctionalBug,
        &[
            "not working", "doesn't work", "does not", "fails", "failed", "broken", "error",
            "crash", "500", "404",
        ],
    ),
    (
        FindingType::UiIssue,
        &[
            "layout", "overlap", "misaligned", "alignment", "css", "style", "visual",
            "responsive", "cut off", "truncated",
        ],
    ),
];

static KNOWN_MISSPELLING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(contakt|recieve|seperate|occured|definately|adress|acheive|untill|wich|teh|accomodate|enviroment|existance|goverment|succesful|neccessary)\b",
    )
    .expect("static regex")
});
static QUOTED_INSTEAD_OF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)["'‘’“”]([^"'‘’“”]{1,40})["'‘’“”]\s+(?:instead of|should be|rather than)"#)
        .expect("static regex")
});
static TYPO_MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:typo|misspell(?:ed|ing)?)\b[^"'‘’“”]{0,20}["'‘’“”]([^"'‘’“”]{1,40})["'‘’“”]"#)
        .expect("static regex")
});
static UNDEFINED_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(undefined|null|nan)\b").expect("static regex"));
static DROPDOWN_FAILURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:dropdown|drop-down|select(?:or| box| menu)?)\b.*\b(?:error|fail(?:s|ed|ure)?|broken)\b")
        .expect("static regex")
});
static ERROR_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z]{2,}[-_]?\d{2,}|E\d{2,}|[45]\d{2})\b").expect("static regex")
});
static CONSOLE_MESSAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)console\s+error\s*[:\-]?\s*(.+)$").expect("static regex")
});
static BROKEN_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)broken\s+image.*?([\w.-]+\.(?:png|jpe?g|gif|svg|webp|avif))")
        .expect("static regex")
});
static VALIDATION_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\b(?:validation|required|invalid)\b.*?\b(?:field|input)\b\s*["'‘’“”]?([\w-]+)"#)
        .expect("static regex")
});
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));
static UUID_SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("static regex")
});
static CRITICAL_TERMS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(crash(?:es|ed)?|500|security|xss|injection|data loss)\b")
        .expect("static regex")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BugSignature {
    pub key: String,
    pub bug_type: FindingType,
    pub page_pattern: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedBug {
    pub id: FindingId,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub steps_to_reproduce: Vec<String>,
    pub page_url: String,
    pub reported_at: DateTime<Utc>,
    pub signature: BugSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum MatchKind {
    Exact,
    Fuzzy { similarity: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateMatch {
    pub bug_id: FindingId,
    pub kind: MatchKind,
}

type KeyExtractor = fn(&str) -> Option<String>;

// Ordered extraction patterns. The first one that produces a key decides the bug type.
const SIGNATURE_PATTERNS: &[(FindingType, KeyExtractor)] = &[
    (FindingType::Typo, known_misspelling_key),
    (FindingType::Typo, quoted_typo_key),
    (FindingType::UndefinedValue, undefined_value_key),
    (FindingType::DropdownError, dropdown_error_key),
    (FindingType::ConsoleError, console_error_key),
    (FindingType::BrokenImage, broken_image_key),
    (FindingType::ValidationError, validation_field_key),
];

/// Decides whether a newly observed issue was already reported in this run.
///
/// Matching is two-tiered: an exact signature key across all bugs, then keyword
/// similarity against bugs of the same type only.
#[derive(Debug, Clone)]
pub struct BugDeduplicationService {
    similarity_threshold: f64,
    bugs: Vec<ReportedBug>,
}

impl BugDeduplicationService {
    pub fn new(similarity_threshold: f64) -> Self {
        Self {
            similarity_threshold,
            bugs: Vec::new(),
        }
    }

    pub fn extract_signature(&self, description: &str, page_url: &str) -> BugSignature {
        extract_signature(description, page_url)
    }

    pub fn find_duplicate(&self, description: &str, page_url: &str) -> Option<DuplicateMatch> {
        let signature = extract_signature(description, page_url);

        if let Some(bug) = self.bugs.iter().find(|b| b.signature.key == signature.key) {
            return Some(DuplicateMatch {
                bug_id: bug.id,
                kind: MatchKind::Exact,
            });
        }

        self.bugs
            .iter()
            .filter(|b| b.signature.bug_type == signature.bug_type)
            .map(|b| (b, jaccard_similarity(&b.signature.keywords, &signature.keywords)))
            .filter(|(_, similarity)| *similarity >= self.similarity_threshold)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(bug, similarity)| DuplicateMatch {
                bug_id: bug.id,
                kind: MatchKind::Fuzzy { similarity },
            })
    }

    /// Id of the already-reported bug this description duplicates, if any.
    pub fn is_duplicate(&self, description: &str, page_url: &str) -> Option<FindingId> {
        self.find_duplicate(description, page_url).map(|m| m.bug_id)
    }

    pub fn register_bug(&mut self, finding: &Finding) -> BugSignature {
        let signature = extract_signature(&finding.description, &finding.page_url);
        self.bugs.push(ReportedBug {
            id: finding.id,
            title: finding.title.clone(),
            description: finding.description.clone(),
            severity: finding.severity,
            steps_to_reproduce: finding.steps_to_reproduce.clone(),
            page_url: finding.page_url.clone(),
            reported_at: finding.created_at,
            signature: signature.clone(),
        });
        signature
    }

    pub fn reported_bugs(&self) -> &[ReportedBug] {
        &self.bugs
    }

    pub fn len(&self) -> usize {
        self.bugs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bugs.is_empty()
    }

    pub fn clear(&mut self) {
        self.bugs.clear();
    }
}

impl Default for BugDeduplicationService {
    fn default() -> Self {
        Self::new(0.6)
    }
}

pub fn extract_signature(description: &str, page_url: &str) -> BugSignature {
    let keywords = extract_keywords(description);
    let page_pattern = page_pattern(page_url);

    for (bug_type, extractor) in SIGNATURE_PATTERNS {
        if let Some(key) = extractor(description) {
            return BugSignature {
                key,
                bug_type: *bug_type,
                page_pattern,
                keywords,
            };
        }
    }

    let key = format!(
        "generic:{}",
        keywords
            .iter()
            .take(GENERIC_KEY_KEYWORDS)
            .cloned()
            .collect::<Vec<_>>()
            .join(",")
    );

    BugSignature {
        key,
        bug_type: infer_type(description),
        page_pattern,
        keywords,
    }
}

pub fn infer_type(description: &str) -> FindingType {
    let lower = description.to_lowercase();
    TYPE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| contains_term(&lower, w)))
        .map(|(bug_type, _)| *bug_type)
        .unwrap_or(FindingType::Other)
}

// Substring match anchored at a word start, so "nan" does not fire inside "maintenance".
fn contains_term(haystack: &str, term: &str) -> bool {
    haystack.match_indices(term).any(|(idx, _)| {
        haystack[..idx]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true)
    })
}

pub fn classify_severity(bug_type: FindingType, description: &str) -> Severity {
    if CRITICAL_TERMS.is_match(description) {
        Severity::Critical
    } else {
        bug_type.base_severity()
    }
}

pub fn extract_keywords(description: &str) -> Vec<String> {
    let cleaned: String = description
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();

    let mut seen = HashSet::new();
    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(w.to_string()))
        .take(MAX_KEYWORDS)
        .map(String::from)
        .collect()
}

pub fn jaccard_similarity(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

// URL path with ids generalized, keeping `#/route` fragments of single-page apps.
pub fn page_pattern(page_url: &str) -> String {
    match Url::parse(page_url) {
        Ok(url) => {
            let path = generalize_segments(url.path());
            match url.fragment() {
                Some(fragment) if fragment.starts_with('/') => {
                    format!("{}#{}", path, generalize_segments(fragment))
                }
                _ => path,
            }
        }
        Err(_) => generalize_segments(page_url),
    }
}

fn generalize_segments(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
                ":id"
            } else if UUID_SEGMENT.is_match(segment) {
                ":uuid"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn known_misspelling_key(description: &str) -> Option<String> {
    KNOWN_MISSPELLING
        .captures(description)
        .map(|c| format!("typo:{}", c[1].to_lowercase()))
}

fn quoted_typo_key(description: &str) -> Option<String> {
    QUOTED_INSTEAD_OF
        .captures(description)
        .or_else(|| TYPO_MENTION.captures(description))
        .map(|c| format!("typo:{}", c[1].trim().to_lowercase()))
}

fn undefined_value_key(description: &str) -> Option<String> {
    let token = UNDEFINED_TOKEN.captures(description)?[1].to_lowercase();
    let lower = description.to_lowercase();

    let context = if ["dropdown", "select", "option"].iter().any(|w| lower.contains(w)) {
        Some("dropdown")
    } else if ["text", "label", "title", "heading", "display", "shows"]
        .iter()
        .any(|w| lower.contains(w))
    {
        Some("text")
    } else {
        None
    };

    Some(match context {
        Some(context) => format!("undefined:{}:{}", context, token),
        None => format!("undefined:{}", token),
    })
}

fn dropdown_error_key(description: &str) -> Option<String> {
    if !DROPDOWN_FAILURE.is_match(description) {
        return None;
    }
    let code = ERROR_CODE
        .captures(description)
        .map(|c| c[1].to_lowercase())
        .unwrap_or_else(|| "generic".to_string());
    Some(format!("dropdown:{}", code))
}

fn console_error_key(description: &str) -> Option<String> {
    let message = CONSOLE_MESSAGE.captures(description)?[1].to_lowercase();
    let message = DIGITS.replace_all(&message, "n");
    let message: String = message
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | '`'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    Some(format!(
        "console:{}",
        message.chars().take(MAX_CONSOLE_KEY).collect::<String>()
    ))
}

fn broken_image_key(description: &str) -> Option<String> {
    BROKEN_IMAGE
        .captures(description)
        .map(|c| format!("image:{}", c[1].to_lowercase()))
}

fn validation_field_key(description: &str) -> Option<String> {
    VALIDATION_FIELD
        .captures(description)
        .map(|c| format!("validation:{}", c[1].to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;

    fn finding(description: &str, page_url: &str) -> Finding {
        let signature = extract_signature(description, page_url);
        Finding::new(
            SessionId::new_v4(),
            signature.bug_type,
            classify_severity(signature.bug_type, description),
            description,
            page_url,
        )
    }

    #[test]
    fn test_exact_match_on_known_misspelling() {
        let mut service = BugDeduplicationService::default();
        let bug = finding(
            "Typo: 'Contakt' instead of 'Contact'",
            "https://shop.test/contact",
        );
        let signature = service.register_bug(&bug);
        assert_eq!(signature.key, "typo:contakt");
        assert_eq!(signature.bug_type, FindingType::Typo);

        let duplicate = service.find_duplicate("contakt", "https://shop.test/about");
        assert_eq!(
            duplicate,
            Some(DuplicateMatch {
                bug_id: bug.id,
                kind: MatchKind::Exact
            })
        );
        assert_eq!(service.is_duplicate("contakt", "https://shop.test"), Some(bug.id));
    }

    #[test]
    fn test_fuzzy_match_same_type() {
        let mut service = BugDeduplicationService::default();
        let original = finding(
            "Product price displays undefined on the checkout summary",
            "https://shop.test/checkout",
        );
        service.register_bug(&original);

        let paraphrase = "Checkout summary product price displays NaN";
        let signature = extract_signature(paraphrase, "https://shop.test/checkout");
        assert_eq!(signature.bug_type, FindingType::UndefinedValue);
        assert_ne!(signature.key, service.reported_bugs()[0].signature.key);

        match service.find_duplicate(paraphrase, "https://shop.test/checkout") {
            Some(DuplicateMatch {
                bug_id,
                kind: MatchKind::Fuzzy { similarity },
            }) => {
                assert_eq!(bug_id, original.id);
                assert!(similarity >= 0.6);
            }
            other => panic!("expected fuzzy match, got {:?}", other),
        }
    }

    #[test]
    fn test_no_match_without_keyword_overlap() {
        let mut service = BugDeduplicationService::default();
        service.register_bug(&finding(
            "Product price displays undefined on the checkout summary",
            "https://shop.test/checkout",
        ));

        assert!(service
            .is_duplicate("Username label renders null", "https://shop.test/profile")
            .is_none());
    }

    #[test]
    fn test_fuzzy_match_never_crosses_types() {
        let mut service = BugDeduplicationService::new(0.3);
        service.register_bug(&finding(
            "Search results layout overlaps footer on mobile",
            "https://shop.test/search",
        ));

        let signature = extract_signature(
            "Search results footer misspelling 'Serach'",
            "https://shop.test/search",
        );
        assert_eq!(signature.bug_type, FindingType::Typo);
        assert!(service
            .is_duplicate(
                "Search results footer misspelling 'Serach'",
                "https://shop.test/search"
            )
            .is_none());
    }

    #[test]
    fn test_pattern_order_typo_before_undefined() {
        let signature = extract_signature(
            "Typo in heading: 'Welcom' instead of 'Welcome', shows undefined nearby",
            "https://shop.test",
        );
        assert_eq!(signature.bug_type, FindingType::Typo);
        assert_eq!(signature.key, "typo:welcom");
    }

    #[test]
    fn test_undefined_context_sniffing() {
        assert_eq!(
            extract_signature("Country dropdown option reads undefined", "https://a.test").key,
            "undefined:dropdown:undefined"
        );
        assert_eq!(
            extract_signature("Cart total label is NaN", "https://a.test").key,
            "undefined:text:nan"
        );
        assert_eq!(
            extract_signature("Order id is null after submit", "https://a.test").key,
            "undefined:null"
        );
    }

    #[test]
    fn test_dropdown_error_code_capture() {
        let with_code = extract_signature(
            "Shipping dropdown throws error DD-4021 when opened",
            "https://a.test",
        );
        assert_eq!(with_code.bug_type, FindingType::DropdownError);
        assert_eq!(with_code.key, "dropdown:dd-4021");

        let without_code =
            extract_signature("Size dropdown fails to open", "https://a.test");
        assert_eq!(without_code.key, "dropdown:generic");
    }

    #[test]
    fn test_console_error_key_ignores_numbers() {
        let a = extract_signature(
            "Console error: Failed to load resource: 404 at line 12",
            "https://a.test",
        );
        let b = extract_signature(
            "Console error: Failed to load resource: 404 at line 88",
            "https://a.test",
        );
        assert_eq!(a.bug_type, FindingType::ConsoleError);
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn test_broken_image_and_validation_keys() {
        assert_eq!(
            extract_signature("Broken image on hero banner: /img/Hero-1.png", "https://a.test").key,
            "image:hero-1.png"
        );
        assert_eq!(
            extract_signature("Required field 'email' accepts empty value", "https://a.test").key,
            "validation:email"
        );
    }

    #[test]
    fn test_generic_fallback() {
        let signature = extract_signature(
            "Add to cart button is not working on mobile devices",
            "https://a.test",
        );
        assert_eq!(signature.bug_type, FindingType::FunctionalBug);
        assert_eq!(signature.key, "generic:add,cart,button,not,working");
    }

    #[test]
    fn test_type_inference_respects_word_starts() {
        assert_eq!(infer_type("Scheduled maintenance banner overlaps"), FindingType::UiIssue);
        assert_eq!(infer_type("Something odd happened"), FindingType::Other);
    }

    #[test]
    fn test_keyword_extraction() {
        let keywords = extract_keywords("The Submit button, when clicked, does NOTHING!!! at all");
        assert_eq!(keywords, vec!["submit", "button", "clicked", "nothing"]);

        let many = extract_keywords(
            "alpha bravo charlie delta echo foxtrot golf hotel india juliet kilo lima",
        );
        assert_eq!(many.len(), MAX_KEYWORDS);
    }

    #[test]
    fn test_page_pattern_generalizes_ids() {
        assert_eq!(
            page_pattern("https://shop.test/products/123/reviews"),
            "/products/:id/reviews"
        );
        assert_eq!(
            page_pattern("https://shop.test/orders/3f2b8c4e-1a2b-4c3d-8e9f-0a1b2c3d4e5f"),
            "/orders/:uuid"
        );
        assert_eq!(
            page_pattern("https://spa.test/#/items/42"),
            "/#/items/:id"
        );
        assert_eq!(page_pattern("https://spa.test/about#team"), "/about");
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            classify_severity(FindingType::Typo, "Typo 'teh' in footer"),
            Severity::Low
        );
        assert_eq!(
            classify_severity(FindingType::FunctionalBug, "Checkout returns 500"),
            Severity::Critical
        );
        assert_eq!(
            classify_severity(FindingType::ConsoleError, "Console error: x is not a function"),
            Severity::Medium
        );
    }

    #[test]
    fn test_clear_resets_state() {
        let mut service = BugDeduplicationService::default();
        service.register_bug(&finding("Typo 'teh' in footer", "https://a.test"));
        assert_eq!(service.len(), 1);
        service.clear();
        assert!(service.is_empty());
        assert!(service.is_duplicate("teh", "https://a.test").is_none());
    }
}
