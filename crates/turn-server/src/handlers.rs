//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use assistant_tools::{Expense, ToolkitError, WeeklyTotals};
use turn_core::{AgentError, CallRecord, ConversationStore, Message, RunAssistant, Session, SessionKey, TurnReport};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider_connected: bool,
    pub assistant_configured: bool,
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Defaults to a fresh session
    #[serde(default)]
    pub session_key: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_key: String,
    pub message: String,
    pub calls: Vec<CallRecord>,
    pub failed_calls: usize,
}

impl ChatResponse {
    fn from_report(key: SessionKey, report: TurnReport) -> Self {
        Self {
            session_key: key.to_string(),
            failed_calls: report.failures().count(),
            message: report.answer,
            calls: report.calls,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_key: String,
    pub title: String,
    pub thread_id: Option<String>,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_key: session.key.to_string(),
            title: session.title(),
            thread_id: session.metadata.thread_id.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            messages: session.conversation.messages().to_vec(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_key: String,
    pub title: String,
    pub message_count: usize,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct ExpenseForm {
    pub email: String,
    pub category: String,
    pub amount: Decimal,

    /// Defaults to today
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct ExpenseResponse {
    pub message: String,
    pub week_number: u32,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, code: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

/// Map a turn error onto an HTTP error
pub fn agent_error(e: &AgentError) -> ApiError {
    let status = match e {
        AgentError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        AgentError::Timeout(_) | AgentError::PollTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AgentError::ProviderUnavailable(_) | AgentError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        AgentError::Provider(_)
        | AgentError::Auth(_)
        | AgentError::UnknownFunction(_)
        | AgentError::DuplicateCallId(_)
        | AgentError::RunAborted(_)
        | AgentError::NoFinalAnswer(_)
        | AgentError::MaxIterations(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(code = e.code(), "Turn failed: {}", e);
    } else {
        tracing::warn!(code = e.code(), "Turn rejected: {}", e);
    }

    error(status, e.code(), e.user_message())
}

fn toolkit_error(e: &ToolkitError) -> ApiError {
    match e {
        ToolkitError::InvalidAmount(_) | ToolkitError::InvalidExpense(_) => {
            error(StatusCode::BAD_REQUEST, "INVALID_EXPENSE", e.user_message())
        }
        _ => {
            tracing::error!("Ledger error: {}", e);
            error(StatusCode::INTERNAL_SERVER_ERROR, "LEDGER_ERROR", e.user_message())
        }
    }
}

fn session_key(raw: Option<String>) -> Result<SessionKey, ApiError> {
    match raw {
        None => Ok(SessionKey::generate()),
        Some(key) if key.trim().is_empty() => Err(error(
            StatusCode::BAD_REQUEST,
            "INVALID_REQUEST",
            "session_key must not be blank",
        )),
        Some(key) => Ok(SessionKey::from_string(key.trim())),
    }
}

fn require_runs(state: &AppState) -> Result<&RunAssistant, ApiError> {
    state.runs.as_deref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "ASSISTANT_DISABLED",
            "No assistant is configured. Set OPENAI_ASSISTANT_ID.",
        )
    })
}

fn load_session(store: &dyn ConversationStore, key: String) -> Result<Json<SessionResponse>, ApiError> {
    let key = SessionKey::from_string(key);
    let session = store
        .load(&key)
        .map_err(|e| agent_error(&e))?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "NOT_FOUND", format!("No session '{}'", key)))?;

    Ok(Json(session.into()))
}

fn require_message(message: &str) -> Result<(), ApiError> {
    if message.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "INVALID_REQUEST", "message must not be empty"));
    }
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let provider_connected = state.provider.health_check().await.unwrap_or(false);

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider_connected,
        assistant_configured: state.runs.is_some(),
        tools: state.chat.tools().names().into_iter().map(String::from).collect(),
    })
}

/// Request/response turn
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    require_message(&payload.message)?;
    let key = session_key(payload.session_key)?;

    let report = state
        .chat
        .respond(&key, &payload.message)
        .await
        .map_err(|e| agent_error(&e))?;

    Ok(Json(ChatResponse::from_report(key, report)))
}

/// Run-based turn against the configured assistant
pub async fn assistant_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let runs = require_runs(&state)?;
    require_message(&payload.message)?;
    let key = session_key(payload.session_key)?;

    let cancel = state.shutdown.child_token();
    let report = runs
        .respond(&key, &payload.message, &cancel)
        .await
        .map_err(|e| agent_error(&e))?;

    Ok(Json(ChatResponse::from_report(key, report)))
}

/// Stored chat history for one session
pub async fn session_history(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    load_session(state.chat.store().as_ref(), key)
}

/// Stored run-assistant history for one session
pub async fn assistant_history(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let runs = require_runs(&state)?;
    load_session(runs.store().as_ref(), key)
}

/// Most recently updated chat sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionSummary>>, ApiError> {
    let sessions = state.chat.store().list(query.limit).map_err(|e| agent_error(&e))?;

    Ok(Json(
        sessions
            .iter()
            .map(|s| SessionSummary {
                session_key: s.key.to_string(),
                title: s.title(),
                message_count: s.message_count(),
                updated_at: s.updated_at,
            })
            .collect(),
    ))
}

/// Expense form: write to the ledger, then note it in the user's history
pub async fn add_expense(
    State(state): State<AppState>,
    Json(form): Json<ExpenseForm>,
) -> Result<Json<ExpenseResponse>, ApiError> {
    let date = form.date.unwrap_or_else(|| Utc::now().date_naive());
    let expense =
        Expense::new(&form.email, &form.category, form.amount, date).map_err(|e| toolkit_error(&e))?;

    let note = format!(
        "Added an expense: {} - {} on {}",
        expense.category,
        expense.amount,
        expense.expense_date.format("%Y-%m-%d")
    );
    let message = format!(
        "Expense of {} for {} added successfully!",
        expense.amount, expense.category
    );
    let week_number = expense.week_number();
    let key = SessionKey::from_string(expense.email.clone());

    state.ledger.add(expense).await.map_err(|e| toolkit_error(&e))?;

    let noted = match &state.runs {
        Some(runs) => runs.append_note(&key, &note).await,
        None => state.chat.append_note(&key, &note).await,
    };
    // ledger write stands even if the note cannot be saved
    if let Err(e) = noted {
        tracing::warn!(session = %key, error = %e, "Failed to note expense in session history");
    }

    Ok(Json(ExpenseResponse { message, week_number }))
}

/// Week number → total spent for one user
pub async fn weekly_stats(
    State(state): State<AppState>,
    Path(email): Path<String>,
) -> Result<Json<WeeklyTotals>, ApiError> {
    let totals = state
        .ledger
        .weekly_totals(&email)
        .await
        .map_err(|e| toolkit_error(&e))?;
    Ok(Json(totals))
}
