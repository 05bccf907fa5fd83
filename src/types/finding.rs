use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FindingId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    Typo,
    UndefinedValue,
    DropdownError,
    ConsoleError,
    BrokenImage,
    ValidationError,
    FunctionalBug,
    UiIssue,
    Other,
}

impl FindingType {
    pub fn as_str(&self) -> &str {
        match self {
            FindingType::Typo => "typo",
            FindingType::UndefinedValue => "undefined_value",
            FindingType::DropdownError => "dropdown_error",
            FindingType::ConsoleError => "console_error",
            FindingType::BrokenImage => "broken_image",
            FindingType::ValidationError => "validation_error",
            FindingType::FunctionalBug => "functional_bug",
            FindingType::UiIssue => "ui_issue",
            FindingType::Other => "other",
        }
    }

    pub fn base_severity(&self) -> Severity {
        match self {
            FindingType::UndefinedValue
            | FindingType::DropdownError
            | FindingType::FunctionalBug => Severity::High,
            FindingType::ConsoleError
            | FindingType::BrokenImage
            | FindingType::ValidationError
            | FindingType::Other => Severity::Medium,
            FindingType::Typo | FindingType::UiIssue => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    pub fn is_severe(&self) -> bool {
        *self >= Severity::High
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: FindingId,
    pub session_id: SessionId,
    pub finding_type: FindingType,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub page_url: String,
    pub steps_to_reproduce: Vec<String>,
    pub step_number: u32,
    pub created_at: DateTime<Utc>,
}

impl Finding {
    pub fn new(
        session_id: SessionId,
        finding_type: FindingType,
        severity: Severity,
        description: impl Into<String>,
        page_url: impl Into<String>,
    ) -> Self {
        let description = description.into();
        Self {
            id: FindingId::new_v4(),
            session_id,
            finding_type,
            severity,
            title: make_title(finding_type, &description),
            description,
            page_url: page_url.into(),
            steps_to_reproduce: Vec::new(),
            step_number: 0,
            created_at: Utc::now(),
        }
    }

    pub fn with_steps(mut self, steps: Vec<String>) -> Self {
        self.steps_to_reproduce = steps;
        self
    }

    pub fn at_step(mut self, step_number: u32) -> Self {
        self.step_number = step_number;
        self
    }

    pub fn summary_line(&self) -> String {
        format!(
            "[{}] {} ({})",
            self.severity.as_str(),
            self.title,
            self.page_url
        )
    }
}

fn make_title(finding_type: FindingType, description: &str) -> String {
    const MAX_TITLE: usize = 80;
    let first_line = description.lines().next().unwrap_or("").trim();
    let mut title: String = first_line.chars().take(MAX_TITLE).collect();
    if first_line.chars().count() > MAX_TITLE {
        title.push_str("...");
    }
    if title.is_empty() {
        return finding_type.as_str().replace('_', " ");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_truncation() {
        let long = "a".repeat(120);
        let finding = Finding::new(
            SessionId::new_v4(),
            FindingType::Other,
            Severity::Low,
            long,
            "https://shop.test",
        );
        assert_eq!(finding.title.len(), 83);
        assert!(finding.title.ends_with("..."));
    }

    #[test]
    fn test_empty_description_falls_back_to_type() {
        let finding = Finding::new(
            SessionId::new_v4(),
            FindingType::BrokenImage,
            Severity::Medium,
            "",
            "https://shop.test",
        );
        assert_eq!(finding.title, "broken image");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High.is_severe());
        assert!(!Severity::Medium.is_severe());
    }
}
