//! Application State

use std::sync::Arc;

use assistant_tools::ExpenseLedger;
use turn_core::{CancellationToken, ChatAssistant, CompletionService, RunAssistant};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Request/response assistant
    pub chat: Arc<ChatAssistant>,

    /// Run-based assistant (None if no assistant id is configured)
    pub runs: Option<Arc<RunAssistant>>,

    /// Completion backend, for health checks
    pub provider: Arc<dyn CompletionService>,

    /// Expense ledger behind the finance tools
    pub ledger: Arc<dyn ExpenseLedger>,

    /// Cancelled on shutdown; in-flight runs stop polling
    pub shutdown: CancellationToken,
}
