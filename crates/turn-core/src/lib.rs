//! # turn-core
//!
//! Tool-calling loop controller with provider-agnostic completion backends,
//! a typed function registry and pluggable conversation stores.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                ChatAssistant / RunAssistant                  │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────┐  │
//! │  │  ToolLoop / │  │    Tool     │  │  CompletionService / │  │
//! │  │   RunLoop   │──│  Registry   │──│  RunService          │  │
//! │  └─────────────┘  └─────────────┘  └──────────────────────┘  │
//! │         │                                                    │
//! │  ┌──────────────────────────────┐                            │
//! │  │ ConversationStore + Locks    │                            │
//! │  └──────────────────────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! `CompletionService` covers request/response backends, `RunService` covers
//! submit/poll backends. The controller drives either one without changes.

pub mod assistant;
pub mod controller;
pub mod error;
pub mod message;
pub mod provider;
pub mod run;
pub mod session;
pub mod testing;
pub mod tool;

pub use assistant::{AssistantBuilder, ChatAssistant, RunAssistant};
pub use controller::{CallOutcome, CallRecord, RunLoop, ToolLoop, TurnConfig, TurnReport, TurnState};
pub use error::{AgentError, Result};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, CompletionRequest, CompletionService, GenerationOptions, ToolChoice};
pub use run::{PollPolicy, RunHandle, RunService, RunSnapshot, RunStatus};
pub use session::{
    ConversationStore, FileSessionStore, MemorySessionStore, Session, SessionKey, SessionLocks,
};
pub use tool::{Tool, ToolCall, ToolContext, ToolRegistry, ToolResult, ToolSchema, TypedTool};

pub use tokio_util::sync::CancellationToken;
