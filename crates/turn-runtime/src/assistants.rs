//! OpenAI Assistants Client
//!
//! Implementation of `RunService` over the threads/runs API. A thread holds
//! the remote history; a run is polled until it completes or asks for
//! function outputs.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use turn_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::ProviderInfo,
    run::{RunHandle, RunService, RunSnapshot, RunStatus},
    tool::{ToolCall, ToolResult, ToolSchema},
};

use crate::openai::{ApiToolCall, OpenAiConfig, api_tools, check_status, decode_arguments, network_error};

const BETA_HEADER: (&str, &str) = ("OpenAI-Beta", "assistants=v2");

/// Map a remote run status onto [`RunStatus`]
pub fn map_status(status: &str) -> RunStatus {
    match status {
        "queued" => RunStatus::Queued,
        "in_progress" | "cancelling" => RunStatus::Running,
        "requires_action" => RunStatus::RequiresAction,
        "completed" => RunStatus::Completed,
        "expired" => RunStatus::Expired,
        "cancelled" => RunStatus::Cancelled,
        // "failed", "incomplete" and anything unrecognised
        _ => RunStatus::Failed,
    }
}

/// OpenAI Assistants API client
pub struct OpenAiAssistantsClient {
    client: reqwest::Client,
    config: OpenAiConfig,
    assistant_id: String,
    instructions: Option<String>,
}

impl OpenAiAssistantsClient {
    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        let assistant_id = config
            .assistant_id
            .clone()
            .ok_or_else(|| AgentError::Config("OPENAI_ASSISTANT_ID is not set".into()))?;

        Ok(Self {
            client: config.http_client()?,
            config,
            assistant_id,
            instructions: None,
        })
    }

    /// Override the assistant's stored instructions on every run
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self
            .client
            .get(self.config.url(path))
            .bearer_auth(&self.config.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {}", e)))
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let response = self
            .client
            .post(self.config.url(path))
            .bearer_auth(&self.config.api_key)
            .header(BETA_HEADER.0, BETA_HEADER.1)
            .json(body)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {}", e)))
    }

    fn run_body(&self, tools: &[ToolSchema]) -> Value {
        let mut body = json!({ "assistant_id": self.assistant_id });
        // without tools the assistant's own configuration applies
        if !tools.is_empty() {
            body["tools"] = json!(api_tools(tools));
        }
        if let Some(instructions) = &self.instructions {
            body["instructions"] = json!(instructions);
        }
        body
    }

    fn outputs_body(results: &[ToolResult]) -> Value {
        let outputs: Vec<Value> = results
            .iter()
            .map(|r| json!({ "tool_call_id": r.id, "output": r.payload() }))
            .collect();
        json!({ "tool_outputs": outputs })
    }

    fn snapshot(run: ApiRun) -> RunSnapshot {
        let status = map_status(&run.status);
        let pending_calls = run
            .required_action
            .map(|action| {
                action
                    .submit_tool_outputs
                    .tool_calls
                    .into_iter()
                    .map(|tc| ToolCall::new(tc.id, tc.function.name, decode_arguments(&tc.function.arguments)))
                    .collect()
            })
            .unwrap_or_default();

        RunSnapshot {
            status,
            pending_calls,
            last_error: run.last_error.map(|e| format!("{}: {}", e.code, e.message)),
        }
    }

    fn replies_path(run: &RunHandle) -> String {
        format!("threads/{}/messages?run_id={}&order=desc&limit=20", run.thread_id, run.id)
    }

    /// Newest assistant message produced by `run_id`
    fn reply_text(list: ApiMessageList, run_id: &str) -> Option<String> {
        list.data
            .into_iter()
            .find(|m| m.role == "assistant" && m.run_id.as_deref() == Some(run_id))
            .map(|m| {
                m.content
                    .into_iter()
                    .filter_map(|part| part.text.map(|t| t.value))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
    }
}

#[async_trait]
impl RunService for OpenAiAssistantsClient {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "OpenAI Assistants".into(),
            endpoint: Some(self.config.base_url.clone()),
            model: Some(self.assistant_id.clone()),
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        match self.get::<Value>(&format!("assistants/{}", self.assistant_id)).await {
            Ok(_) => Ok(true),
            Err(e) => {
                tracing::warn!("Assistants health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn create_thread(&self) -> Result<String> {
        let thread: ApiObject = self.post("threads", &json!({})).await?;
        Ok(thread.id)
    }

    async fn append_message(&self, thread_id: &str, message: &Message) -> Result<()> {
        // threads only accept user and assistant messages
        let role = match message.role {
            Role::Assistant => "assistant",
            Role::User | Role::System | Role::Tool => "user",
        };
        let _: ApiObject = self
            .post(
                &format!("threads/{}/messages", thread_id),
                &json!({ "role": role, "content": message.content }),
            )
            .await?;
        Ok(())
    }

    async fn start_run(&self, thread_id: &str, tools: &[ToolSchema]) -> Result<RunHandle> {
        let run: ApiObject = self
            .post(&format!("threads/{}/runs", thread_id), &self.run_body(tools))
            .await?;

        Ok(RunHandle {
            id: run.id,
            thread_id: thread_id.to_string(),
        })
    }

    async fn poll(&self, run: &RunHandle) -> Result<RunSnapshot> {
        let api_run: ApiRun = self
            .get(&format!("threads/{}/runs/{}", run.thread_id, run.id))
            .await?;
        Ok(Self::snapshot(api_run))
    }

    async fn submit_tool_outputs(&self, run: &RunHandle, results: &[ToolResult]) -> Result<()> {
        let _: ApiObject = self
            .post(
                &format!("threads/{}/runs/{}/submit_tool_outputs", run.thread_id, run.id),
                &Self::outputs_body(results),
            )
            .await?;
        Ok(())
    }

    async fn cancel_run(&self, run: &RunHandle) -> Result<()> {
        let _: ApiObject = self
            .post(&format!("threads/{}/runs/{}/cancel", run.thread_id, run.id), &json!({}))
            .await?;
        Ok(())
    }

    async fn latest_reply(&self, run: &RunHandle) -> Result<Option<String>> {
        let list: ApiMessageList = self.get(&Self::replies_path(run)).await?;
        Ok(Self::reply_text(list, &run.id))
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiRun {
    status: String,
    required_action: Option<ApiRequiredAction>,
    last_error: Option<ApiRunError>,
}

#[derive(Debug, Deserialize)]
struct ApiRequiredAction {
    submit_tool_outputs: ApiSubmitToolOutputs,
}

#[derive(Debug, Deserialize)]
struct ApiSubmitToolOutputs {
    tool_calls: Vec<ApiToolCall>,
}

#[derive(Debug, Deserialize)]
struct ApiRunError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiMessageList {
    data: Vec<ApiThreadMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiThreadMessage {
    role: String,
    #[serde(default)]
    run_id: Option<String>,
    #[serde(default)]
    content: Vec<ApiContentPart>,
}

#[derive(Debug, Deserialize)]
struct ApiContentPart {
    text: Option<ApiText>,
}

#[derive(Debug, Deserialize)]
struct ApiText {
    value: String,
}
