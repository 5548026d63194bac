//! Scripted Services
//!
//! Deterministic completion and run backends for tests and offline demos.
//! Each one replays a fixed script and records what it was asked.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::{Completion, CompletionRequest, CompletionService, ProviderInfo, ToolChoice};
use crate::run::{RunHandle, RunService, RunSnapshot};
use crate::tool::{ToolResult, ToolSchema};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a scripted service was asked on one completion request
#[derive(Clone, Debug)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub tool_choice: ToolChoice,
}

/// Completion service that replays a fixed list of completions
#[derive(Default)]
pub struct ScriptedCompletions {
    script: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedCompletions {
    pub fn new(script: Vec<Completion>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another completion
    pub fn push(&self, completion: Completion) {
        lock(&self.script).push_back(completion);
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletions {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "scripted".into(),
            endpoint: None,
            model: None,
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        lock(&self.requests).push(RecordedRequest {
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            tool_choice: request.tool_choice,
        });

        lock(&self.script)
            .pop_front()
            .ok_or_else(|| AgentError::Provider("completion script exhausted".into()))
    }
}

/// Run service that replays a fixed sequence of run snapshots
#[derive(Default)]
pub struct ScriptedRuns {
    snapshots: Mutex<VecDeque<RunSnapshot>>,
    fallback: Option<RunSnapshot>,
    reply: Mutex<Option<String>>,
    appended: Mutex<Vec<(String, Message)>>,
    submitted: Mutex<Vec<Vec<ToolResult>>>,
    cancelled: Mutex<Vec<String>>,
    threads: AtomicUsize,
    runs: AtomicUsize,
    polls: AtomicUsize,
}

impl ScriptedRuns {
    pub fn new(snapshots: Vec<RunSnapshot>) -> Self {
        Self {
            snapshots: Mutex::new(snapshots.into()),
            ..Default::default()
        }
    }

    /// Keep returning `snapshot` once the script runs out
    pub fn repeat_last(mut self, snapshot: RunSnapshot) -> Self {
        self.fallback = Some(snapshot);
        self
    }

    /// Assistant reply returned once the run completes
    pub fn with_reply(self, reply: impl Into<String>) -> Self {
        *lock(&self.reply) = Some(reply.into());
        self
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn threads_created(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    /// Messages appended to remote threads, as `(thread_id, message)`
    pub fn appended(&self) -> Vec<(String, Message)> {
        lock(&self.appended).clone()
    }

    /// Result batches handed back to runs
    pub fn submitted(&self) -> Vec<Vec<ToolResult>> {
        lock(&self.submitted).clone()
    }

    /// Run ids a cancel was requested for
    pub fn cancelled(&self) -> Vec<String> {
        lock(&self.cancelled).clone()
    }
}

#[async_trait]
impl RunService for ScriptedRuns {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "scripted-runs".into(),
            endpoint: None,
            model: None,
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn create_thread(&self) -> Result<String> {
        let n = self.threads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("thread_{n}"))
    }

    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<()> {
        lock(&self.appended).push((thread_id.to_string(), message.clone()));
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, _tools: &[ToolSchema]) -> Result<RunHandle> {
        let n = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RunHandle {
            id: format!("run_{n}"),
            thread_id: thread_id.to_string(),
        })
    }

    async fn poll(&self, _run: &RunHandle) -> Result<RunSnapshot> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        lock(&self.snapshots)
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| AgentError::Provider("run script exhausted".into()))
    }

    async fn submit_tool_outputs(&self, _run: &RunHandle, results: &[ToolResult]) -> Result<()> {
        lock(&self.submitted).push(results.to_vec());
        Ok(())
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<()> {
        lock(&self.cancelled).push(run.id.clone());
        Ok(())
    }

    async fn latest_reply(&self, _run: &RunHandle) -> Result<Option<String>> {
        Ok(lock(&self.reply).clone())
    }
}
