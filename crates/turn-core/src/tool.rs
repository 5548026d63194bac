//! Tool System
//!
//! Function registry for the tool-calling loop. Tools are registered at
//! startup and invoked by the controller when the model requests them.
//!
//! Every invocation receives a [`ToolContext`] naming the session the turn
//! belongs to. Tools that act on a user's data take the user from there,
//! never from the model's arguments.
//!
//! Two ways to implement a tool:
//!
//! - [`Tool`] works on the raw JSON arguments of a [`ToolCall`].
//! - [`TypedTool`] declares a typed argument record and a typed output.
//!   Arguments are decoded at the registry boundary, so a malformed call
//!   never reaches the function body.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};
use crate::session::{Session, SessionKey};

/// Per-turn facts handed to every invocation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolContext {
    /// Session the turn runs on
    pub session: SessionKey,

    /// Remote thread backing the session, if any
    pub thread_id: Option<String>,
}

impl ToolContext {
    pub fn new(session: impl Into<SessionKey>) -> Self {
        Self {
            session: session.into(),
            thread_id: None,
        }
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn for_session(session: &Session) -> Self {
        Self {
            session: session.key.clone(),
            thread_id: session.metadata.thread_id.clone(),
        }
    }
}

/// Function call request from the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call id, unique within one completion response
    pub id: String,

    /// Tool identifier
    pub name: String,

    /// Arguments as a flat JSON object
    #[serde(default = "empty_arguments")]
    pub arguments: Value,
}

fn empty_arguments() -> Value {
    Value::Object(Map::new())
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Id of the call this answers
    #[serde(default)]
    pub id: String,

    /// Tool that was called
    pub name: String,

    /// Whether execution succeeded
    pub success: bool,

    /// Result value (or `{"error": ...}` on failure)
    pub value: Value,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, value: Value) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            success: true,
            value,
        }
    }

    pub fn failure(name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            success: false,
            value: json!({ "error": error.to_string() }),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Serialized value as sent back to the model
    pub fn payload(&self) -> String {
        self.value.to_string()
    }
}

/// Parameter definition for tool schema
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ParameterSchema {
    /// Parameter name
    pub name: String,

    /// JSON Schema type (string, number, integer, boolean)
    #[serde(rename = "type")]
    pub param_type: String,

    /// Human-readable description
    pub description: String,

    /// Whether this parameter is required
    #[serde(default)]
    pub required: bool,

    /// Default value if not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Enum of allowed values
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,

    /// JSON Schema format hint (e.g. "date")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl ParameterSchema {
    pub fn new(
        name: impl Into<String>,
        param_type: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            param_type: param_type.into(),
            description: description.into(),
            required: false,
            default: None,
            enum_values: None,
            format: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_enum(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// Tool definition schema (for LLM function calling)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier
    pub name: String,

    /// Human-readable description (shown to LLM)
    pub description: String,

    /// Parameter definitions
    pub parameters: Vec<ParameterSchema>,

    /// Category for grouping
    #[serde(default)]
    pub category: Option<String>,

    /// Whether tool has side effects
    #[serde(default)]
    pub has_side_effects: bool,
}

impl ToolSchema {
    /// Render the flat parameter list as a JSON Schema object
    pub fn parameters_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            let mut prop = Map::new();
            prop.insert("type".into(), json!(param.param_type));
            prop.insert("description".into(), json!(param.description));
            if let Some(values) = &param.enum_values {
                prop.insert("enum".into(), json!(values));
            }
            if let Some(default) = &param.default {
                prop.insert("default".into(), default.clone());
            }
            if let Some(format) = &param.format {
                prop.insert("format".into(), json!(format));
            }
            properties.insert(param.name.clone(), Value::Object(prop));

            if param.required {
                required.push(json!(param.name));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool's schema for LLM function calling
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments
    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult>;

    /// Validate arguments before execution
    fn validate(&self, call: &ToolCall) -> Result<()> {
        let Some(args) = call.arguments.as_object() else {
            return Err(AgentError::ToolValidation(format!(
                "Arguments for '{}' must be a JSON object",
                call.name
            )));
        };

        let schema = self.schema();
        for param in &schema.parameters {
            if param.required && args.get(&param.name).is_none_or(Value::is_null) {
                return Err(AgentError::ToolValidation(format!(
                    "Missing required parameter: {}",
                    param.name
                )));
            }
        }

        Ok(())
    }
}

/// A tool with a typed argument record and a typed result
#[async_trait]
pub trait TypedTool: Send + Sync + 'static {
    /// Argument record decoded from the call
    type Args: DeserializeOwned + Send;

    /// Result value encoded into the tool message
    type Output: Serialize + Send;

    fn schema(&self) -> ToolSchema;

    async fn call(&self, args: Self::Args, ctx: &ToolContext) -> Result<Self::Output>;
}

/// Adapter that exposes a [`TypedTool`] through the [`Tool`] interface
pub struct Typed<T>(pub T);

#[async_trait]
impl<T: TypedTool> Tool for Typed<T> {
    fn schema(&self) -> ToolSchema {
        self.0.schema()
    }

    async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult> {
        let args: T::Args = serde_json::from_value(call.arguments.clone())
            .map_err(|e| AgentError::ToolValidation(format!("{}: {}", call.name, e)))?;

        let output = self.0.call(args, ctx).await?;

        Ok(ToolResult::success(&call.name, serde_json::to_value(output)?).with_id(&call.id))
    }
}

/// Registry for available tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a new tool
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let schema = tool.schema();
        self.tools.insert(schema.name, Arc::new(tool));
    }

    /// Register a typed tool
    pub fn register_typed<T: TypedTool>(&mut self, tool: T) {
        self.register(Typed(tool));
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Check whether a name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool call in place
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownFunction(call.name.clone()))?;

        tool.validate(call)?;
        tool.execute(call, ctx).await
    }

    /// Execute a tool call on its own task.
    ///
    /// If the caller drops the returned future, the spawned invocation still
    /// runs to completion and its result is discarded.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| AgentError::UnknownFunction(call.name.clone()))?;
        let owned = call.clone();
        let ctx = ctx.clone();

        let handle = tokio::spawn(async move {
            tool.validate(&owned)?;
            tool.execute(&owned, &ctx).await
        });

        handle.await.map_err(|e| AgentError::FunctionExecution {
            name: call.name.clone(),
            message: e.to_string(),
        })?
    }

    /// All tool schemas, ordered by name
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self.tools.values().map(|t| t.schema()).collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

// ============================================================================
// Built-in Tools
// ============================================================================

/// Arguments and output of [`EchoTool`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EchoArgs {
    pub x: Value,
}

/// Echo tool - returns its argument record unchanged
pub struct EchoTool;

#[async_trait]
impl TypedTool for EchoTool {
    type Args = EchoArgs;
    type Output = EchoArgs;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "echo".into(),
            description: "Return the given value unchanged".into(),
            parameters: vec![ParameterSchema::new("x", "string", "Value to echo back").required()],
            category: Some("debug".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, args: EchoArgs, _ctx: &ToolContext) -> Result<EchoArgs> {
        Ok(args)
    }
}

/// Output format for [`DateTimeTool`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFormat {
    Iso,
    #[default]
    Human,
    Unix,
    Date,
}

#[derive(Debug, Deserialize)]
pub struct DateTimeArgs {
    #[serde(default)]
    pub format: DateFormat,
}

/// DateTime tool - returns current time
pub struct DateTimeTool;

#[async_trait]
impl TypedTool for DateTimeTool {
    type Args = DateTimeArgs;
    type Output = String;

    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "datetime".into(),
            description: "Get the current date and time".into(),
            parameters: vec![
                ParameterSchema::new("format", "string", "Output format: 'iso', 'human', 'unix' or 'date'")
                    .with_default(json!("human"))
                    .with_enum(vec![json!("iso"), json!("human"), json!("unix"), json!("date")]),
            ],
            category: Some("time".into()),
            has_side_effects: false,
        }
    }

    async fn call(&self, args: DateTimeArgs, _ctx: &ToolContext) -> Result<String> {
        let now = chrono::Utc::now();

        Ok(match args.format {
            DateFormat::Iso => now.to_rfc3339(),
            DateFormat::Unix => now.timestamp().to_string(),
            DateFormat::Date => now.format("%Y-%m-%d").to_string(),
            DateFormat::Human => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
        })
    }
}
