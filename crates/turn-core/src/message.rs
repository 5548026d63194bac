//! Conversation Messages
//!
//! Standard message format used across the turn runtime. Assistant messages
//! may carry the function calls the model requested; tool messages carry the
//! id of the call they answer.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tool::{ToolCall, ToolResult};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Function result reported back to the model
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content
    pub content: String,

    /// Function calls requested by the assistant
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Optional name (function name for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

/// Additional message metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Tool call ID (for tool messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Model that generated this (for assistant messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Custom key-value pairs
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            name: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create an assistant message that requests function calls
    pub fn assistant_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        let mut msg = Self::new(Role::Assistant, content);
        msg.tool_calls = calls;
        msg
    }

    /// Create a tool message answering the call identified by `result.id`
    pub fn tool_result(result: &ToolResult) -> Self {
        let mut msg = Self::new(Role::Tool, result.payload());
        msg.name = Some(result.name.clone());
        msg.metadata = Some(MessageMetadata {
            tool_call_id: Some(result.id.clone()),
            ..Default::default()
        });
        msg
    }

    /// Record the model that produced this message
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(MessageMetadata::default).model = Some(model.into());
        self
    }

    /// The call id a tool message answers
    pub fn tool_call_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.tool_call_id.as_deref()
    }

    /// Whether this assistant message requests function calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Ordered, append-only conversation history
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        let mut conv = Self::new();
        conv.push(Message::system(prompt));
        conv
    }

    /// Put `prompt` in front unless the history already opens with a
    /// system message
    pub fn ensure_system_prompt(&mut self, prompt: impl Into<String>) {
        if self.messages.first().map(|m| m.role) != Some(Role::System) {
            self.messages.insert(0, Message::system(prompt));
        }
    }

    /// Add a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Every call id the assistant has requested so far
    pub fn call_ids(&self) -> HashSet<&str> {
        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .collect()
    }

    /// Call ids that have no tool result yet
    pub fn unanswered_calls(&self) -> Vec<&str> {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .filter_map(Message::tool_call_id)
            .collect();

        self.messages
            .iter()
            .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
            .filter(|id| !answered.contains(id))
            .collect()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello");
        assert!(!msg.has_tool_calls());
    }

    #[test]
    fn test_conversation() {
        let mut conv = Conversation::with_system_prompt("You are helpful.");
        conv.push(Message::user("Hi"));
        conv.push(Message::assistant("Hello!"));

        assert_eq!(conv.len(), 3);
        assert!(conv.last().unwrap().role == Role::Assistant);
    }

    #[test]
    fn test_tool_result_message_links_call() {
        let result = ToolResult::success("echo", json!({"x": "hi"})).with_id("call_1");
        let msg = Message::tool_result(&result);

        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id(), Some("call_1"));
        assert_eq!(msg.name.as_deref(), Some("echo"));
        assert_eq!(msg.content, r#"{"x":"hi"}"#);
    }

    #[test]
    fn test_unanswered_calls() {
        let mut conv = Conversation::new();
        conv.push(Message::user("weather in Goa and Pune?"));
        conv.push(Message::assistant_calls(
            "",
            vec![
                ToolCall::new("call_a", "get_weather", json!({"city": "Goa"})),
                ToolCall::new("call_b", "get_weather", json!({"city": "Pune"})),
            ],
        ));
        conv.push(Message::tool_result(
            &ToolResult::success("get_weather", json!({"temp_C": "31"})).with_id("call_a"),
        ));

        assert_eq!(conv.call_ids().len(), 2);
        assert_eq!(conv.unanswered_calls(), vec!["call_b"]);
    }

    #[test]
    fn test_assistant_calls_serialize_round() {
        let msg = Message::assistant_calls("", vec![ToolCall::new("c1", "echo", json!({"x": 1}))]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["tool_calls"][0]["name"], "echo");

        let plain = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(plain.get("tool_calls").is_none());
    }
}
