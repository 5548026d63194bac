//! Assistants
//!
//! Context objects that own everything a turn needs: the completion backend,
//! the function registry, the conversation store, per-session locks and the
//! turn configuration. Handlers hold one of these instead of reaching for
//! process-wide state.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::controller::{RunLoop, ToolLoop, TurnConfig, TurnReport};
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::provider::CompletionService;
use crate::run::{PollPolicy, RunService};
use crate::session::{ConversationStore, MemorySessionStore, Session, SessionKey, SessionLocks};
use crate::tool::{Tool, ToolRegistry, TypedTool};

fn load_or_create(
    store: &dyn ConversationStore,
    key: &SessionKey,
    system_prompt: Option<&str>,
) -> Result<Session> {
    let mut session = store.load(key)?.unwrap_or_else(|| Session::new(key.clone()));
    if let Some(prompt) = system_prompt {
        session.conversation.ensure_system_prompt(prompt);
    }
    Ok(session)
}

fn save_touched(store: &dyn ConversationStore, session: &mut Session) -> Result<()> {
    session.touch();
    store.save(session)
}

/// Request/response assistant
pub struct ChatAssistant {
    tool_loop: ToolLoop,
    store: Arc<dyn ConversationStore>,
    locks: SessionLocks,
    system_prompt: Option<String>,
}

impl ChatAssistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::new()
    }

    /// Run one turn for `key`.
    ///
    /// The session is persisted only when the turn produces a final answer;
    /// on error the stored history is left as it was before the turn.
    pub async fn respond(&self, key: &SessionKey, input: &str) -> Result<TurnReport> {
        let _guard = self.locks.acquire(key).await;

        let mut session = load_or_create(self.store.as_ref(), key, self.system_prompt.as_deref())?;
        session.push(Message::user(input));

        let report = self.tool_loop.run_turn(&mut session).await?;
        save_touched(self.store.as_ref(), &mut session)?;

        tracing::info!(
            session = %key,
            calls = report.calls.len(),
            failures = report.failures().count(),
            "Turn completed"
        );

        Ok(report)
    }

    /// Stored history for `key`
    pub fn history(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.store.load(key)
    }

    /// Append a note to the session history without running a turn
    pub async fn append_note(&self, key: &SessionKey, note: &str) -> Result<()> {
        let _guard = self.locks.acquire(key).await;

        let mut session = load_or_create(self.store.as_ref(), key, self.system_prompt.as_deref())?;
        session.push(Message::user(note));
        save_touched(self.store.as_ref(), &mut session)
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.tool_loop.tools()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }
}

/// Submit/poll assistant bound to remote threads
pub struct RunAssistant {
    runs: Arc<dyn RunService>,
    run_loop: RunLoop,
    store: Arc<dyn ConversationStore>,
    locks: SessionLocks,
}

impl RunAssistant {
    pub fn builder() -> AssistantBuilder {
        AssistantBuilder::new()
    }

    /// Remote thread for the session, created and persisted on first contact
    async fn ensure_thread(&self, session: &mut Session) -> Result<String> {
        if let Some(thread_id) = &session.metadata.thread_id {
            return Ok(thread_id.clone());
        }

        let thread_id = self.runs.create_thread().await?;
        session.metadata.thread_id = Some(thread_id.clone());
        save_touched(self.store.as_ref(), session)?;

        tracing::info!(session = %session.key, thread = %thread_id, "Created remote thread");
        Ok(thread_id)
    }

    /// Remote thread id for `key`, creating one if needed
    pub async fn thread_for(&self, key: &SessionKey) -> Result<String> {
        let _guard = self.locks.acquire(key).await;
        let mut session = load_or_create(self.store.as_ref(), key, None)?;
        self.ensure_thread(&mut session).await
    }

    /// Post `input` to the session's thread and drive a run to completion.
    ///
    /// Local history is persisted only on success. The thread binding itself
    /// is saved as soon as the thread exists.
    pub async fn respond(
        &self,
        key: &SessionKey,
        input: &str,
        cancel: &CancellationToken,
    ) -> Result<TurnReport> {
        let _guard = self.locks.acquire(key).await;

        let mut session = load_or_create(self.store.as_ref(), key, None)?;
        let thread_id = self.ensure_thread(&mut session).await?;

        let message = Message::user(input);
        self.runs.append_message(&thread_id, &message).await?;
        session.push(message);

        let report = self.run_loop.run_turn(&mut session, cancel).await?;
        save_touched(self.store.as_ref(), &mut session)?;

        tracing::info!(
            session = %key,
            thread = %thread_id,
            calls = report.calls.len(),
            "Run turn completed"
        );

        Ok(report)
    }

    /// Stored history for `key`
    pub fn history(&self, key: &SessionKey) -> Result<Option<Session>> {
        self.store.load(key)
    }

    /// Append a note locally and, if the session has a thread, remotely
    pub async fn append_note(&self, key: &SessionKey, note: &str) -> Result<()> {
        let _guard = self.locks.acquire(key).await;

        let mut session = load_or_create(self.store.as_ref(), key, None)?;
        let message = Message::user(note);
        if let Some(thread_id) = &session.metadata.thread_id {
            self.runs.append_message(thread_id, &message).await?;
        }
        session.push(message);
        save_touched(self.store.as_ref(), &mut session)
    }

    pub fn tools(&self) -> &ToolRegistry {
        self.run_loop.tools()
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }
}

/// Builder for assistant configuration
pub struct AssistantBuilder {
    completions: Option<Arc<dyn CompletionService>>,
    runs: Option<Arc<dyn RunService>>,
    store: Option<Arc<dyn ConversationStore>>,
    locks: SessionLocks,
    tools: ToolRegistry,
    system_prompt: Option<String>,
    config: TurnConfig,
}

impl Default for AssistantBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantBuilder {
    pub fn new() -> Self {
        Self {
            completions: None,
            runs: None,
            store: None,
            locks: SessionLocks::new(),
            tools: ToolRegistry::new(),
            system_prompt: None,
            config: TurnConfig::default(),
        }
    }

    pub fn completions(mut self, provider: Arc<dyn CompletionService>) -> Self {
        self.completions = Some(provider);
        self
    }

    pub fn runs(mut self, service: Arc<dyn RunService>) -> Self {
        self.runs = Some(service);
        self
    }

    pub fn store(mut self, store: Arc<dyn ConversationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share session locks with another assistant serving the same users
    pub fn locks(mut self, locks: SessionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.register(tool);
        self
    }

    pub fn typed_tool<T: TypedTool>(mut self, tool: T) -> Self {
        self.tools.register_typed(tool);
        self
    }

    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn completion_timeout(mut self, timeout: Duration) -> Self {
        self.config.completion_timeout = timeout;
        self
    }

    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn poll_policy(mut self, policy: PollPolicy) -> Self {
        self.config.poll = policy;
        self
    }

    pub fn config(mut self, config: TurnConfig) -> Self {
        self.config = config;
        self
    }

    fn store_or_default(store: Option<Arc<dyn ConversationStore>>) -> Arc<dyn ConversationStore> {
        store.unwrap_or_else(|| Arc::new(MemorySessionStore::new()))
    }

    pub fn build_chat(self) -> Result<ChatAssistant> {
        let provider = self
            .completions
            .ok_or_else(|| AgentError::Config("Completion service is required".into()))?;

        Ok(ChatAssistant {
            tool_loop: ToolLoop::new(provider, Arc::new(self.tools), self.config),
            store: Self::store_or_default(self.store),
            locks: self.locks,
            system_prompt: self.system_prompt,
        })
    }

    /// Runs carry their own instructions remotely, so no system prompt is
    /// seeded into local history.
    pub fn build_runs(self) -> Result<RunAssistant> {
        let runs = self
            .runs
            .ok_or_else(|| AgentError::Config("Run service is required".into()))?;

        Ok(RunAssistant {
            run_loop: RunLoop::new(runs.clone(), Arc::new(self.tools), self.config),
            runs,
            store: Self::store_or_default(self.store),
            locks: self.locks,
        })
    }
}
