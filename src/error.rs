use thiserror::Error;

use crate::types::ExplorationState;

#[derive(Debug, Error)]
pub enum ExplorationError {
    #[error("page extraction failed: {0}")]
    PageExtraction(String),
    #[error("decision oracle failed: {message}")]
    Oracle { message: String, retryable: bool },
    #[error("action execution failed: {0}")]
    ActionExecution(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: ExplorationState,
        to: ExplorationState,
    },
    #[error("browser error: {0}")]
    Browser(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

impl ExplorationError {
    pub fn oracle(message: impl Into<String>, retryable: bool) -> Self {
        ExplorationError::Oracle {
            message: message.into(),
            retryable,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ExplorationError::InvalidConfiguration(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ExplorationError::Oracle { retryable, .. } => *retryable,
            ExplorationError::Browser(_) => true,
            _ => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExplorationError::InvalidTransition { .. })
    }
}

pub fn classify(err: &anyhow::Error) -> Option<&ExplorationError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<ExplorationError>())
}

// Errors without a typed cause (plain I/O, HTTP transport) are treated as transient.
pub fn is_retryable(err: &anyhow::Error) -> bool {
    classify(err).map(|e| e.is_retryable()).unwrap_or(true)
}
