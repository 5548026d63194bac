//! Completion Service Strategy
//!
//! Defines a common interface for request/response completion backends
//! (OpenAI chat completions, any OpenAI-compatible endpoint, test doubles)
//! so the tool loop works with any of them without code changes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use turn_core::provider::{CompletionRequest, CompletionService, ToolChoice};
//!
//! let completion = service
//!     .complete(CompletionRequest {
//!         messages: session.conversation.messages(),
//!         tools: &registry.schemas(),
//!         tool_choice: ToolChoice::Auto,
//!         options: &options,
//!     })
//!     .await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::Message;
use crate::tool::{ToolCall, ToolSchema};

/// Configuration for LLM generation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Model identifier (e.g., "gpt-4o-mini")
    pub model: String,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

fn default_temperature() -> f32 { 0.7 }
fn default_max_tokens() -> u32 { 2048 }
fn default_top_p() -> f32 { 0.9 }

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            stop_sequences: Vec::new(),
        }
    }
}

/// Whether the model may request function calls on this request
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides
    #[default]
    Auto,
    /// Function calls forbidden; plain content only
    None,
}

/// One request to the completion service
#[derive(Clone, Copy, Debug)]
pub struct CompletionRequest<'a> {
    /// Full session history, oldest first
    pub messages: &'a [Message],

    /// Function catalog offered to the model
    pub tools: &'a [ToolSchema],

    pub tool_choice: ToolChoice,

    pub options: &'a GenerationOptions,
}

/// Response from an LLM completion
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Completion {
    /// The generated text
    pub content: String,

    /// Function calls requested by the model
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Model that generated this response
    pub model: String,

    /// Token usage statistics (if available)
    pub usage: Option<TokenUsage>,

    /// Finish reason
    pub finish_reason: Option<FinishReason>,
}

impl Completion {
    /// A plain-content completion
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            model: String::new(),
            usage: None,
            finish_reason: Some(FinishReason::Stop),
        }
    }

    /// A completion requesting function calls
    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: String::new(),
            tool_calls,
            model: String::new(),
            usage: None,
            finish_reason: Some(FinishReason::ToolUse),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Convert into the assistant message appended to the session
    pub fn into_message(self) -> Message {
        let msg = Message::assistant_calls(self.content, self.tool_calls);
        if self.model.is_empty() {
            msg
        } else {
            msg.with_model(self.model)
        }
    }
}

/// Token usage statistics
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Reason for completion finishing
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolUse,
    ContentFilter,
    Error,
}

impl FinishReason {
    /// Map an OpenAI-style `finish_reason` string
    pub fn from_api(reason: &str) -> Self {
        match reason {
            "stop" => FinishReason::Stop,
            "length" => FinishReason::Length,
            "tool_calls" | "function_call" => FinishReason::ToolUse,
            "content_filter" => FinishReason::ContentFilter,
            _ => FinishReason::Error,
        }
    }
}

/// Provider metadata
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "openai")
    pub name: String,

    /// Base URL or other locator
    pub endpoint: Option<String>,

    /// Default model
    pub model: Option<String>,

    /// Whether tool/function calling is supported
    pub supports_tools: bool,
}

/// Strategy trait for request/response completion backends
///
/// Implement this trait to add support for new LLM backends.
/// The tool loop works exclusively through this interface.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Get provider information and capabilities
    async fn info(&self) -> Result<ProviderInfo>;

    /// Check if the provider is available and configured correctly
    async fn health_check(&self) -> Result<bool>;

    /// Generate a completion for the given history and catalog
    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion>;
}
