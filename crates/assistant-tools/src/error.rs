//! Error Types for the Assistant Toolkit

use rust_decimal::Decimal;
use thiserror::Error;
use turn_core::AgentError;

pub type Result<T> = std::result::Result<T, ToolkitError>;

#[derive(Error, Debug)]
pub enum ToolkitError {
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid amount {0}: expenses must not be negative")]
    InvalidAmount(Decimal),

    #[error("Invalid expense: {0}")]
    InvalidExpense(String),

    #[error("Weather service error: {0}")]
    Weather(String),

    #[error("Unknown city: {0}")]
    CityNotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ToolkitError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolkitError::Network(_) | ToolkitError::Weather(_))
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            ToolkitError::InvalidAmount(_) => "Expense amounts must be zero or more.".into(),
            ToolkitError::InvalidExpense(msg) => format!("That expense could not be recorded: {}", msg),
            ToolkitError::CityNotFound(city) => format!("No weather data for '{}'.", city),
            ToolkitError::Weather(_) | ToolkitError::Network(_) => {
                "The weather service is unavailable right now.".into()
            }
            _ => "Something went wrong".into(),
        }
    }

    /// Convert into the turn error reported for `tool`
    pub fn into_agent_error(self, tool: &str) -> AgentError {
        match self {
            ToolkitError::InvalidAmount(_) | ToolkitError::InvalidExpense(_) => {
                AgentError::ToolValidation(self.to_string())
            }
            other => AgentError::FunctionExecution {
                name: tool.to_string(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_invalid_amount_is_validation_error() {
        let err = ToolkitError::InvalidAmount(dec!(-5)).into_agent_error("add_expense");
        assert!(matches!(err, AgentError::ToolValidation(_)));
    }

    #[test]
    fn test_weather_failure_names_tool() {
        let err = ToolkitError::Weather("HTTP 503".into()).into_agent_error("get_weather");
        assert!(matches!(err, AgentError::FunctionExecution { name, .. } if name == "get_weather"));
    }
}
