pub mod context;
pub mod decision;
pub mod finding;
pub mod page;
pub mod session;

pub use context::{
    create_context, AgentContext, NavigationState, PageProgress, PendingCheckpoint, Rejection,
};
pub use decision::{ActionDecision, ActionResult, DecisionRequest, DecisionResponse, TokenUsage};
pub use finding::{Finding, FindingType, Severity};
pub use page::{InteractiveElement, LlmPageContext, PageLink, PageState};
pub use session::{ExplorationResult, ExplorationSession, ExplorationStep, SessionStatus, StoppedReason};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type AgentId = String;
pub type SessionId = Uuid;
pub type FindingId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExplorationState {
    Init,
    ExtractingPage,
    CollectingSuggestions,
    GettingLlmDecision,
    ValidatingDecision,
    ExecutingAction,
    ProcessingFindings,
    CheckingExit,
    WaitingCheckpoint,
    Done,
    Error,
}

impl ExplorationState {
    pub const ALL: [ExplorationState; 11] = [
        ExplorationState::Init,
        ExplorationState::ExtractingPage,
        ExplorationState::CollectingSuggestions,
        ExplorationState::GettingLlmDecision,
        ExplorationState::ValidatingDecision,
        ExplorationState::ExecutingAction,
        ExplorationState::ProcessingFindings,
        ExplorationState::CheckingExit,
        ExplorationState::WaitingCheckpoint,
        ExplorationState::Done,
        ExplorationState::Error,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ExplorationState::Init => "INIT",
            ExplorationState::ExtractingPage => "EXTRACTING_PAGE",
            ExplorationState::CollectingSuggestions => "COLLECTING_SUGGESTIONS",
            ExplorationState::GettingLlmDecision => "GETTING_LLM_DECISION",
            ExplorationState::ValidatingDecision => "VALIDATING_DECISION",
            ExplorationState::ExecutingAction => "EXECUTING_ACTION",
            ExplorationState::ProcessingFindings => "PROCESSING_FINDINGS",
            ExplorationState::CheckingExit => "CHECKING_EXIT",
            ExplorationState::WaitingCheckpoint => "WAITING_CHECKPOINT",
            ExplorationState::Done => "DONE",
            ExplorationState::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ExplorationState::Done | ExplorationState::Error)
    }

    pub fn valid_transitions(&self) -> &'static [ExplorationState] {
        use ExplorationState::*;
        match self {
            Init => &[ExtractingPage, Error],
            ExtractingPage => &[CollectingSuggestions, Error],
            CollectingSuggestions => &[GettingLlmDecision, Error],
            GettingLlmDecision => &[ValidatingDecision, WaitingCheckpoint, Done, Error],
            ValidatingDecision => &[ExecutingAction, GettingLlmDecision, Error],
            ExecutingAction => &[ProcessingFindings, Error],
            ProcessingFindings => &[CheckingExit, WaitingCheckpoint, Error],
            CheckingExit => &[ExtractingPage, Done, Error],
            WaitingCheckpoint => &[ExtractingPage, Done, GettingLlmDecision, Error],
            Done | Error => &[],
        }
    }

    pub fn can_transition_to(&self, next: ExplorationState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for ExplorationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Navigate,
    Click,
    Fill,
    Select,
    Hover,
    Scroll,
    Back,
    Refresh,
    Wait,
    Tool,
    Done,
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            ActionType::Navigate => "navigate",
            ActionType::Click => "click",
            ActionType::Fill => "fill",
            ActionType::Select => "select",
            ActionType::Hover => "hover",
            ActionType::Scroll => "scroll",
            ActionType::Back => "back",
            ActionType::Refresh => "refresh",
            ActionType::Wait => "wait",
            ActionType::Tool => "tool",
            ActionType::Done => "done",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "navigate" | "goto" => Some(ActionType::Navigate),
            "click" => Some(ActionType::Click),
            "fill" | "type" => Some(ActionType::Fill),
            "select" => Some(ActionType::Select),
            "hover" => Some(ActionType::Hover),
            "scroll" => Some(ActionType::Scroll),
            "back" => Some(ActionType::Back),
            "refresh" | "reload" => Some(ActionType::Refresh),
            "wait" => Some(ActionType::Wait),
            "tool" => Some(ActionType::Tool),
            "done" | "finish" => Some(ActionType::Done),
            _ => None,
        }
    }

    // Actions whose `value` carries the whole meaning of the step.
    pub fn requires_value(&self) -> bool {
        matches!(
            self,
            ActionType::Navigate | ActionType::Fill | ActionType::Select
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlCategory {
    Auth,
    User,
    Product,
    Cart,
    Admin,
    Info,
    Other,
}

impl UrlCategory {
    pub fn as_str(&self) -> &str {
        match self {
            UrlCategory::Auth => "auth",
            UrlCategory::User => "user",
            UrlCategory::Product => "product",
            UrlCategory::Cart => "cart",
            UrlCategory::Admin => "admin",
            UrlCategory::Info => "info",
            UrlCategory::Other => "other",
        }
    }

    // Rank used when leaving a page: auth > product > cart > user > info > other.
    // Admin is never chosen ahead of other work.
    pub fn exit_rank(&self) -> u8 {
        match self {
            UrlCategory::Auth => 0,
            UrlCategory::Product => 1,
            UrlCategory::Cart => 2,
            UrlCategory::User => 3,
            UrlCategory::Info => 4,
            UrlCategory::Other => 5,
            UrlCategory::Admin => 6,
        }
    }

    pub fn task_priority(&self) -> u32 {
        match self {
            UrlCategory::Auth => 8,
            UrlCategory::Product => 7,
            UrlCategory::Cart => 6,
            UrlCategory::User => 5,
            UrlCategory::Info => 4,
            UrlCategory::Other | UrlCategory::Admin => 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states_have_no_transitions() {
        assert!(ExplorationState::Done.valid_transitions().is_empty());
        assert!(ExplorationState::Error.valid_transitions().is_empty());
    }

    #[test]
    fn test_every_live_state_can_fail() {
        for state in ExplorationState::ALL {
            if !state.is_terminal() {
                assert!(state.can_transition_to(ExplorationState::Error), "{}", state);
            }
        }
    }

    #[test]
    fn test_action_type_parsing() {
        assert_eq!(ActionType::from_str("Navigate"), Some(ActionType::Navigate));
        assert_eq!(ActionType::from_str(" type "), Some(ActionType::Fill));
        assert_eq!(ActionType::from_str("teleport"), None);
    }

    #[test]
    fn test_task_priority_order() {
        let order = [
            UrlCategory::Auth,
            UrlCategory::Product,
            UrlCategory::Cart,
            UrlCategory::User,
            UrlCategory::Info,
            UrlCategory::Other,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].task_priority() > pair[1].task_priority());
        }
    }
}
