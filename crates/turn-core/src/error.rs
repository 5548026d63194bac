//! Error Types

use std::time::Duration;

use thiserror::Error;

use crate::run::RunStatus;

/// Result type alias for turn operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Turn runtime error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Completion service error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Completion service unavailable or not responding
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Requested function is not in the registry
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    /// Function arguments did not match the declared schema
    #[error("Tool validation error: {0}")]
    ToolValidation(String),

    /// Function raised while executing
    #[error("Function '{name}' failed: {message}")]
    FunctionExecution { name: String, message: String },

    /// A call id appeared twice in one response or was reused in a session
    #[error("Duplicate function call id: {0}")]
    DuplicateCallId(String),

    /// Run reached a terminal non-success status
    #[error("Run aborted with status '{0}'")]
    RunAborted(RunStatus),

    /// The service never produced plain content for this turn
    #[error("No final answer: {0}")]
    NoFinalAnswer(String),

    /// Maximum tool rounds reached in a run
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Run still pending when the poll budget ran out
    #[error("Run still '{status}' after {waited:?}")]
    PollTimeout { status: RunStatus, waited: Duration },

    /// Remote call exceeded the caller-supplied timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Caller abandoned the turn
    #[error("Turn cancelled")]
    Cancelled,

    /// Conversation store unreadable or unwritable
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::Timeout(_)
                | AgentError::PollTimeout { .. }
                | AgentError::Io(_)
        )
    }

    /// Short machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Provider(_) => "PROVIDER_ERROR",
            AgentError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            AgentError::UnknownFunction(_) => "UNKNOWN_FUNCTION",
            AgentError::ToolValidation(_) => "INVALID_ARGUMENTS",
            AgentError::FunctionExecution { .. } => "FUNCTION_FAILED",
            AgentError::DuplicateCallId(_) => "DUPLICATE_CALL_ID",
            AgentError::RunAborted(_) => "RUN_ABORTED",
            AgentError::NoFinalAnswer(_) => "NO_FINAL_ANSWER",
            AgentError::MaxIterations(_) => "MAX_ITERATIONS",
            AgentError::PollTimeout { .. } | AgentError::Timeout(_) => "TIMEOUT",
            AgentError::Cancelled => "CANCELLED",
            AgentError::Persistence(_) => "PERSISTENCE_ERROR",
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::RateLimited(_) => "RATE_LIMITED",
            AgentError::Auth(_) => "AUTH_FAILED",
            AgentError::Io(_) | AgentError::Json(_) | AgentError::Other(_) => "INTERNAL",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::UnknownFunction(name) => format!("The assistant asked for '{}', which is not available.", name),
            AgentError::ToolValidation(msg) => format!("Invalid tool input: {}", msg),
            AgentError::FunctionExecution { name, .. } => format!("The '{}' action failed.", name),
            AgentError::RunAborted(status) => format!("The assistant run ended with status '{}'. Please try again.", status),
            AgentError::NoFinalAnswer(_) => "The assistant did not produce an answer.".into(),
            AgentError::MaxIterations(_) => "The request took too long to process. Please try a simpler query.".into(),
            AgentError::PollTimeout { .. } | AgentError::Timeout(_) => "The AI service took too long to respond.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            AgentError::Persistence(_) => "Your conversation history could not be saved.".into(),
            AgentError::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            AgentError::Auth(_) => "Authentication failed. Please check your credentials.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(AgentError::RateLimited("slow down".into()).is_retryable());
        assert!(AgentError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!AgentError::UnknownFunction("nope".into()).is_retryable());
        assert!(!AgentError::RunAborted(RunStatus::Failed).is_retryable());
    }

    #[test]
    fn test_run_aborted_carries_status() {
        let err = AgentError::RunAborted(RunStatus::Expired);
        assert_eq!(err.to_string(), "Run aborted with status 'expired'");
        assert_eq!(err.code(), "RUN_ABORTED");
    }
}
