//! Error types for the cadence engine.

use thiserror::Error;

/// Errors that can occur in cadence operations.
///
/// Conflicts and frequency caps are not errors; they are reported as
/// [`crate::decision::Outcome`] values on the agenda.
#[derive(Error, Debug)]
pub enum CadenceError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),

    #[error("Invalid activity '{id}': {reason}")]
    InvalidActivity { id: String, reason: String },

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("External calendar unavailable: {0}")]
    Unavailable(String),

    #[error("Provider request timed out after {0:?}")]
    ProviderTimeout(std::time::Duration),

    #[error("Provider '{0}' not found in PATH")]
    ProviderNotInstalled(String),

    #[error("No external calendar configured")]
    NoCalendarConfigured,

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CadenceError {
    /// Whether a failed external call may succeed if issued again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CadenceError::Unavailable(_) | CadenceError::ProviderTimeout(_)
        )
    }

    pub(crate) fn invalid_activity(id: &str, reason: impl Into<String>) -> Self {
        CadenceError::InvalidActivity {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for CadenceError {
    fn from(e: serde_json::Error) -> Self {
        CadenceError::Serialization(e.to_string())
    }
}

/// Result type alias for cadence operations.
pub type CadenceResult<T> = Result<T, CadenceError>;
