//! Runs
//!
//! Submit/poll completion backends. A run is a stateful unit of work on a
//! remote thread that has to be polled until it needs function results,
//! completes, or ends in a terminal failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::ProviderInfo;
use crate::tool::{ToolCall, ToolResult, ToolSchema};

/// Status of a remote run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    RequiresAction,
    Completed,
    Failed,
    Expired,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Expired => "expired",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Still being worked on remotely
    pub fn is_pending(&self) -> bool {
        matches!(self, RunStatus::Queued | RunStatus::Running)
    }

    /// Terminal non-success status
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunStatus::Failed | RunStatus::Expired | RunStatus::Cancelled)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a submitted run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunHandle {
    pub id: String,
    pub thread_id: String,
}

/// One observation of a run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub status: RunStatus,

    /// Calls awaiting results (only when `status` is `RequiresAction`)
    #[serde(default)]
    pub pending_calls: Vec<ToolCall>,

    /// Remote error description, if any
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RunSnapshot {
    pub fn new(status: RunStatus) -> Self {
        Self {
            status,
            pending_calls: Vec::new(),
            last_error: None,
        }
    }

    pub fn requires_action(calls: Vec<ToolCall>) -> Self {
        Self {
            status: RunStatus::RequiresAction,
            pending_calls: calls,
            last_error: None,
        }
    }
}

/// Strategy trait for submit/poll completion backends
#[async_trait]
pub trait RunService: Send + Sync {
    /// Get provider information and capabilities
    async fn info(&self) -> Result<ProviderInfo>;

    /// Check if the service is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Create a remote thread and return its id
    async fn create_thread(&self) -> Result<String>;

    /// Append a message to a remote thread
    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<()>;

    /// Start a run on a thread with the given function catalog
    async fn start_run(&self, thread_id: &str, tools: &[ToolSchema]) -> Result<RunHandle>;

    /// Observe the current state of a run
    async fn poll(&self, run: &RunHandle) -> Result<RunSnapshot>;

    /// Hand function results back to a run waiting on them
    async fn submit_tool_outputs(&self, run: &RunHandle, results: &[ToolResult]) -> Result<()>;

    /// Ask the service to stop a run that is still active
    async fn cancel_run(&self, run: &RunHandle) -> Result<()>;

    /// Most recent assistant reply produced by `run`
    async fn latest_reply(&self, run: &RunHandle) -> Result<Option<String>>;
}

/// Capped exponential backoff for run polling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollPolicy {
    /// Delay after the first poll
    pub initial_interval: Duration,

    /// Upper bound for a single delay
    pub max_interval: Duration,

    /// Growth factor between delays
    pub multiplier: f64,

    /// Total wait budget for one run, across all of its polling phases
    pub max_wait: Duration,

    /// Hard cap on the number of polls
    pub max_polls: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_wait: Duration::from_secs(120),
            max_polls: 600,
        }
    }
}

impl PollPolicy {
    /// Fixed-interval polling
    pub fn fixed(interval: Duration, max_wait: Duration) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            max_wait,
            ..Default::default()
        }
    }

    /// Delay before poll number `attempt + 1`
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(attempt.min(64) as i32);
        Duration::try_from_secs_f64(self.initial_interval.as_secs_f64() * factor)
            .map_or(self.max_interval, |d| d.min(self.max_interval))
    }
}

/// Poll `run` until it needs attention or reaches a terminal status.
///
/// Returns the first snapshot whose status is not queued/running. Fails with
/// `PollTimeout` once the wait budget (measured from `started`, the moment
/// the run was submitted) or the poll cap is spent, and with `Cancelled` as
/// soon as `cancel` fires.
pub async fn poll_until_actionable(
    service: &dyn RunService,
    run: &RunHandle,
    policy: &PollPolicy,
    started: Instant,
    cancel: &CancellationToken,
) -> Result<RunSnapshot> {
    let mut attempt: u32 = 0;

    loop {
        let snapshot = tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            snapshot = service.poll(run) => snapshot?,
        };

        tracing::debug!(run = %run.id, status = %snapshot.status, attempt, "Polled run");

        if !snapshot.status.is_pending() {
            return Ok(snapshot);
        }

        attempt += 1;
        let waited = started.elapsed();
        if waited >= policy.max_wait || attempt >= policy.max_polls {
            return Err(AgentError::PollTimeout {
                status: snapshot.status,
                waited,
            });
        }

        let delay = policy.delay(attempt - 1).min(policy.max_wait - waited);
        tokio::select! {
            () = cancel.cancelled() => return Err(AgentError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRuns;

    #[test]
    fn test_backoff_is_capped() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay(0), Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(10), Duration::from_secs(5));
        assert_eq!(policy.delay(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn test_fixed_policy() {
        let policy = PollPolicy::fixed(Duration::from_secs(5), Duration::from_secs(60));
        assert_eq!(policy.delay(0), Duration::from_secs(5));
        assert_eq!(policy.delay(7), Duration::from_secs(5));
    }

    #[test]
    fn test_status_classification() {
        assert!(RunStatus::Queued.is_pending());
        assert!(RunStatus::Running.is_pending());
        assert!(!RunStatus::RequiresAction.is_pending());
        assert!(RunStatus::Expired.is_aborted());
        assert!(!RunStatus::Completed.is_aborted());
        assert_eq!(
            serde_json::to_string(&RunStatus::RequiresAction).unwrap(),
            r#""requires_action""#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_stops_at_actionable_status() {
        let runs = ScriptedRuns::new(vec![
            RunSnapshot::new(RunStatus::Queued),
            RunSnapshot::new(RunStatus::Running),
            RunSnapshot::new(RunStatus::Completed),
        ]);
        let run = RunHandle { id: "run_1".into(), thread_id: "thread_1".into() };

        let snapshot = poll_until_actionable(
            &runs,
            &run,
            &PollPolicy::default(),
            Instant::now(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(snapshot.status, RunStatus::Completed);
        assert_eq!(runs.poll_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_on_stuck_run() {
        let runs = ScriptedRuns::new(vec![]).repeat_last(RunSnapshot::new(RunStatus::Running));
        let run = RunHandle { id: "run_1".into(), thread_id: "thread_1".into() };
        let policy = PollPolicy {
            max_wait: Duration::from_secs(10),
            ..Default::default()
        };

        let err = poll_until_actionable(&runs, &run, &policy, Instant::now(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::PollTimeout { status: RunStatus::Running, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_counts_from_run_start() {
        let runs = ScriptedRuns::new(vec![]).repeat_last(RunSnapshot::new(RunStatus::Running));
        let run = RunHandle { id: "run_1".into(), thread_id: "thread_1".into() };
        let policy = PollPolicy::fixed(Duration::from_secs(2), Duration::from_secs(10));
        let started = Instant::now();
        tokio::time::advance(Duration::from_secs(9)).await;

        let err = poll_until_actionable(&runs, &run, &policy, started, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            AgentError::PollTimeout { waited, .. } => assert_eq!(waited, Duration::from_secs(10)),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(runs.poll_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_honours_cancellation() {
        let runs = ScriptedRuns::new(vec![]).repeat_last(RunSnapshot::new(RunStatus::Queued));
        let run = RunHandle { id: "run_1".into(), thread_id: "thread_1".into() };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poll_until_actionable(&runs, &run, &PollPolicy::default(), Instant::now(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
