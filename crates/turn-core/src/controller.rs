//! Tool-Calling Loop Controller
//!
//! Drives one user turn to completion. The model may ask for local
//! functions before answering; each requested call is invoked at most once
//! and answered with exactly one tool message before the next completion
//! request goes out.
//!
//! ```text
//!   AwaitingCompletion ──plain content──▶ HasFinalAnswer
//!          │    ▲
//!     calls│    │tools forbidden on follow-up
//!          ▼    │
//!   HasPendingCalls ──▶ CollectingResults
//! ```
//!
//! [`ToolLoop`] talks to a request/response [`CompletionService`];
//! [`RunLoop`] talks to a submit/poll [`RunService`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, CompletionRequest, CompletionService, GenerationOptions, ToolChoice};
use crate::run::{PollPolicy, RunHandle, RunService, RunStatus, poll_until_actionable};
use crate::session::Session;
use crate::tool::{ToolCall, ToolContext, ToolRegistry, ToolResult, ToolSchema};

/// Turn configuration
#[derive(Clone, Debug)]
pub struct TurnConfig {
    /// Generation options
    pub generation: GenerationOptions,

    /// Budget for a single completion request
    pub completion_timeout: Duration,

    /// Maximum `requires_action` rounds in one run
    pub max_tool_rounds: usize,

    /// Polling policy for run-based services
    pub poll: PollPolicy,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            generation: GenerationOptions::default(),
            completion_timeout: Duration::from_secs(60),
            max_tool_rounds: 8,
            poll: PollPolicy::default(),
        }
    }
}

/// Controller states
#[derive(Clone, Debug)]
pub enum TurnState {
    AwaitingCompletion { tools_allowed: bool },
    HasPendingCalls(Completion),
    CollectingResults(Vec<ToolCall>),
    HasFinalAnswer(Completion),
}

impl TurnState {
    pub fn name(&self) -> &'static str {
        match self {
            TurnState::AwaitingCompletion { .. } => "awaiting_completion",
            TurnState::HasPendingCalls(_) => "has_pending_calls",
            TurnState::CollectingResults(_) => "collecting_results",
            TurnState::HasFinalAnswer(_) => "has_final_answer",
        }
    }
}

/// Outcome of one function invocation
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CallOutcome {
    Succeeded,
    Failed(String),
}

/// One function invocation made during a turn
#[derive(Clone, Debug, Serialize)]
pub struct CallRecord {
    pub call_id: String,
    pub name: String,
    pub outcome: CallOutcome,
}

/// Summary of a completed turn
#[derive(Clone, Debug, Default, Serialize)]
pub struct TurnReport {
    /// Final assistant answer
    pub answer: String,

    /// Every function invocation, in order
    pub calls: Vec<CallRecord>,

    /// Completion requests (or run rounds) used
    pub round_trips: usize,
}

impl TurnReport {
    /// Invocations whose function failed
    pub fn failures(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls
            .iter()
            .filter(|c| matches!(c.outcome, CallOutcome::Failed(_)))
    }
}

/// Reject unknown functions and duplicate or reused call ids before any
/// function runs.
fn check_calls(session: &Session, calls: &[ToolCall], tools: &ToolRegistry) -> Result<()> {
    let seen = session.conversation.call_ids();
    let mut batch = HashSet::new();

    for call in calls {
        if !batch.insert(call.id.as_str()) || seen.contains(call.id.as_str()) {
            return Err(AgentError::DuplicateCallId(call.id.clone()));
        }
        if !tools.contains(&call.name) {
            return Err(AgentError::UnknownFunction(call.name.clone()));
        }
    }

    Ok(())
}

/// Invoke every pending call in order, appending one tool message per call.
///
/// Function failures are reported to the model as `{"error": ...}` payloads
/// and recorded in the report; only an unknown function aborts.
async fn collect_results(
    tools: &ToolRegistry,
    session: &mut Session,
    calls: &[ToolCall],
    report: &mut TurnReport,
) -> Result<Vec<ToolResult>> {
    let mut results = Vec::with_capacity(calls.len());
    let ctx = ToolContext::for_session(session);

    for call in calls {
        tracing::debug!(tool = %call.name, call_id = %call.id, "Executing tool");

        let (result, outcome) = match tools.dispatch(call, &ctx).await {
            Ok(mut result) => {
                result.id = call.id.clone();
                result.name = call.name.clone();
                (result, CallOutcome::Succeeded)
            }
            Err(AgentError::UnknownFunction(name)) => return Err(AgentError::UnknownFunction(name)),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "Tool failed");
                let message = match e {
                    AgentError::FunctionExecution { message, .. } => message,
                    other => other.to_string(),
                };
                (
                    ToolResult::failure(&call.name, &message).with_id(&call.id),
                    CallOutcome::Failed(message),
                )
            }
        };

        session.push(Message::tool_result(&result));
        report.calls.push(CallRecord {
            call_id: call.id.clone(),
            name: call.name.clone(),
            outcome,
        });
        results.push(result);
    }

    Ok(results)
}

/// Request/response tool loop
pub struct ToolLoop {
    provider: Arc<dyn CompletionService>,
    tools: Arc<ToolRegistry>,
    config: TurnConfig,
}

impl ToolLoop {
    pub fn new(
        provider: Arc<dyn CompletionService>,
        tools: Arc<ToolRegistry>,
        config: TurnConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    /// Drive one turn over `session`, whose last message is the user input.
    ///
    /// At most two completion requests are made: the second one (after
    /// function results) forbids further calls.
    pub async fn run_turn(&self, session: &mut Session) -> Result<TurnReport> {
        if session.conversation.is_empty() {
            return Err(AgentError::NoFinalAnswer("empty message history".into()));
        }

        let catalog = self.tools.schemas();
        let mut report = TurnReport::default();
        let mut state = TurnState::AwaitingCompletion {
            tools_allowed: !catalog.is_empty(),
        };

        loop {
            tracing::trace!(session = %session.key, state = state.name(), "Turn state");

            state = match state {
                TurnState::AwaitingCompletion { tools_allowed } => {
                    let completion = self.request(session, &catalog, tools_allowed).await?;
                    report.round_trips += 1;

                    if !completion.has_tool_calls() {
                        TurnState::HasFinalAnswer(completion)
                    } else if tools_allowed {
                        TurnState::HasPendingCalls(completion)
                    } else {
                        tracing::warn!(
                            session = %session.key,
                            calls = completion.tool_calls.len(),
                            "Ignoring function calls on a request that forbade them"
                        );
                        TurnState::HasFinalAnswer(Completion {
                            tool_calls: Vec::new(),
                            ..completion
                        })
                    }
                }

                TurnState::HasPendingCalls(completion) => {
                    check_calls(session, &completion.tool_calls, &self.tools)?;
                    let calls = completion.tool_calls.clone();
                    session.push(completion.into_message());
                    TurnState::CollectingResults(calls)
                }

                TurnState::CollectingResults(calls) => {
                    collect_results(&self.tools, session, &calls, &mut report).await?;
                    TurnState::AwaitingCompletion { tools_allowed: false }
                }

                TurnState::HasFinalAnswer(completion) => {
                    report.answer = completion.content.clone();
                    session.push(completion.into_message());
                    return Ok(report);
                }
            };
        }
    }

    async fn request(
        &self,
        session: &Session,
        catalog: &[ToolSchema],
        tools_allowed: bool,
    ) -> Result<Completion> {
        let request = CompletionRequest {
            messages: session.conversation.messages(),
            tools: catalog,
            tool_choice: if tools_allowed { ToolChoice::Auto } else { ToolChoice::None },
            options: &self.config.generation,
        };

        tokio::time::timeout(self.config.completion_timeout, self.provider.complete(request))
            .await
            .map_err(|_| AgentError::Timeout(self.config.completion_timeout))?
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &TurnConfig {
        &self.config
    }
}

/// Submit/poll tool loop
pub struct RunLoop {
    runs: Arc<dyn RunService>,
    tools: Arc<ToolRegistry>,
    config: TurnConfig,
}

impl RunLoop {
    pub fn new(runs: Arc<dyn RunService>, tools: Arc<ToolRegistry>, config: TurnConfig) -> Self {
        Self { runs, tools, config }
    }

    /// Drive one run on the session's remote thread.
    ///
    /// The user input must already be on the remote thread. Results for a
    /// `requires_action` round are appended locally and submitted to the run
    /// together; a run that fails, expires or is cancelled aborts the turn
    /// without appending anything further. When the turn is abandoned
    /// locally while the run is still active, the run is cancelled remotely.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<TurnReport> {
        let thread_id = session
            .metadata
            .thread_id
            .clone()
            .ok_or_else(|| AgentError::Config(format!("session {} has no remote thread", session.key)))?;

        let catalog = self.tools.schemas();
        let started = Instant::now();
        let run = self.runs.start_run(&thread_id, &catalog).await?;
        tracing::debug!(session = %session.key, run = %run.id, "Run started");

        let mut report = TurnReport::default();
        if let Err(err) = self.drive(session, &run, started, &mut report, cancel).await {
            if !matches!(err, AgentError::RunAborted(_)) {
                self.abandon(&run, &err).await;
            }
            return Err(err);
        }

        let answer = self.runs.latest_reply(&run).await?.ok_or_else(|| {
            AgentError::NoFinalAnswer(format!("run {} completed without a reply", run.id))
        })?;
        session.push(Message::assistant(&answer));
        report.answer = answer;
        Ok(report)
    }

    /// Poll and answer `run` until it completes
    async fn drive(
        &self,
        session: &mut Session,
        run: &RunHandle,
        started: Instant,
        report: &mut TurnReport,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut rounds = 0usize;

        loop {
            let snapshot =
                poll_until_actionable(self.runs.as_ref(), run, &self.config.poll, started, cancel).await?;
            report.round_trips += 1;

            match snapshot.status {
                RunStatus::Completed => return Ok(()),

                RunStatus::RequiresAction => {
                    rounds += 1;
                    if rounds > self.config.max_tool_rounds {
                        return Err(AgentError::MaxIterations(self.config.max_tool_rounds));
                    }

                    let calls = snapshot.pending_calls;
                    check_calls(session, &calls, &self.tools)?;
                    session.push(Message::assistant_calls("", calls.clone()));

                    let results = collect_results(&self.tools, session, &calls, report).await?;
                    self.runs.submit_tool_outputs(run, &results).await?;
                }

                status @ (RunStatus::Failed | RunStatus::Expired | RunStatus::Cancelled) => {
                    tracing::warn!(
                        session = %session.key,
                        run = %run.id,
                        status = %status,
                        error = snapshot.last_error.as_deref().unwrap_or(""),
                        "Run aborted"
                    );
                    return Err(AgentError::RunAborted(status));
                }

                // poll_until_actionable never returns a pending status
                RunStatus::Queued | RunStatus::Running => {}
            }
        }
    }

    /// Best-effort remote cancel for a run the turn gave up on
    async fn abandon(&self, run: &RunHandle, reason: &AgentError) {
        let attempt = tokio::time::timeout(self.config.completion_timeout, self.runs.cancel_run(run)).await;
        match attempt {
            Ok(Ok(())) => tracing::info!(run = %run.id, reason = %reason, "Cancelled abandoned run"),
            Ok(Err(e)) => tracing::warn!(run = %run.id, error = %e, "Failed to cancel abandoned run"),
            Err(_) => tracing::warn!(run = %run.id, "Timed out cancelling abandoned run"),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }
}
