//! # turn-runtime
//!
//! Completion backends for turn-core.
//!
//! ## Backends
//!
//! - **OpenAI chat** (`OpenAiChatProvider`): request/response completions over
//!   `/chat/completions`; also serves Ollama and other OpenAI-compatible
//!   endpoints through `OPENAI_BASE_URL`
//! - **OpenAI Assistants** (`OpenAiAssistantsClient`): submit/poll runs over
//!   the threads API
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turn_runtime::OpenAiChatProvider;
//!
//! let provider = OpenAiChatProvider::from_env()?;
//! let assistant = ChatAssistant::builder()
//!     .completions(Arc::new(provider))
//!     .build_chat()?;
//! ```

pub mod assistants;
pub mod openai;

pub use assistants::OpenAiAssistantsClient;
pub use openai::{OpenAiChatProvider, OpenAiConfig};

// Re-export core types for convenience
pub use turn_core::{
    AgentError, ChatAssistant, CompletionService, Message, Result, Role, RunAssistant, RunService,
    Session, Tool, ToolRegistry,
};
