//! OpenAI Chat Provider
//!
//! Implementation of `CompletionService` over `/chat/completions`. Works with
//! OpenAI and any OpenAI-compatible endpoint (Ollama's `/v1`, vLLM, ...).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use turn_core::{
    error::{AgentError, Result},
    message::{Message, Role},
    provider::{
        Completion, CompletionRequest, CompletionService, DEFAULT_MODEL, FinishReason,
        ProviderInfo, TokenUsage, ToolChoice,
    },
    tool::{ToolCall, ToolSchema},
};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// OpenAI provider configuration
#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    /// API key sent as a bearer token
    pub api_key: String,

    /// Base URL, without a trailing slash
    pub base_url: String,

    /// Default model
    pub model: String,

    /// Assistant used for run-based turns
    pub assistant_id: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            assistant_id: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    /// Read `OPENAI_API_KEY`, `OPENAI_BASE_URL`, `OPENAI_MODEL` and
    /// `OPENAI_ASSISTANT_ID`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AgentError::Config("OPENAI_API_KEY is not set".into()))?;
        let base_url = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        let assistant_id = std::env::var("OPENAI_ASSISTANT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty());

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            assistant_id,
            ..Default::default()
        })
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to create HTTP client: {}", e)))
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}

/// Map a non-success response onto the error taxonomy
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Provider returned error");

    Err(match status.as_u16() {
        401 | 403 => AgentError::Auth("Invalid API key or insufficient permissions".into()),
        429 => AgentError::RateLimited(body),
        500..=599 => AgentError::ProviderUnavailable(format!("{}: {}", status, body)),
        _ => AgentError::Provider(format!("{}: {}", status, body)),
    })
}

pub(crate) fn network_error(e: reqwest::Error) -> AgentError {
    if e.is_timeout() || e.is_connect() {
        AgentError::ProviderUnavailable(e.to_string())
    } else {
        AgentError::Provider(e.to_string())
    }
}

/// Decode a wire-format arguments string.
///
/// A string that is not valid JSON is kept as a JSON string, which argument
/// validation then rejects and reports back to the model.
pub(crate) fn decode_arguments(raw: &str) -> Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Render the catalog as an OpenAI `tools` array
pub(crate) fn api_tools(tools: &[ToolSchema]) -> Vec<ApiToolDefinition> {
    tools
        .iter()
        .map(|t| ApiToolDefinition {
            r#type: "function".into(),
            function: ApiToolFunction {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters_json(),
            },
        })
        .collect()
}

/// OpenAI chat completions provider
pub struct OpenAiChatProvider {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiChatProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(OpenAiConfig::new(api_key))
    }

    pub fn from_config(config: OpenAiConfig) -> Result<Self> {
        Ok(Self {
            client: config.http_client()?,
            config,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::from_config(OpenAiConfig::from_env()?)
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.to_string(),
                content: if m.content.is_empty() && m.has_tool_calls() {
                    None
                } else {
                    Some(m.content.clone())
                },
                tool_calls: if m.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| ApiToolCall {
                                id: tc.id.clone(),
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: tc.name.clone(),
                                    arguments: tc.arguments.to_string(),
                                },
                            })
                            .collect(),
                    )
                },
                tool_call_id: match m.role {
                    Role::Tool => m.tool_call_id().map(String::from),
                    _ => None,
                },
            })
            .collect()
    }

    fn request_body(request: &CompletionRequest<'_>) -> Value {
        let options = request.options;
        let mut body = json!({
            "model": options.model,
            "messages": Self::api_messages(request.messages),
            "temperature": options.temperature,
            "top_p": options.top_p,
            "max_tokens": options.max_tokens,
        });

        // OpenAI rejects tool_choice without tools
        if !request.tools.is_empty() {
            body["tools"] = json!(api_tools(request.tools));
            body["tool_choice"] = json!(request.tool_choice);
        }

        if !options.stop_sequences.is_empty() {
            body["stop"] = json!(options.stop_sequences);
        }

        body
    }

    fn convert_response(response: ApiResponse) -> Result<Completion> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("No choices in response".into()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall::new(tc.id, tc.function.name, decode_arguments(&tc.function.arguments)))
            .collect();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default(),
            tool_calls,
            model: response.model,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            }),
            finish_reason: choice.finish_reason.as_deref().map(FinishReason::from_api),
        })
    }
}

#[async_trait]
impl CompletionService for OpenAiChatProvider {
    async fn info(&self) -> Result<ProviderInfo> {
        Ok(ProviderInfo {
            name: "OpenAI".into(),
            endpoint: Some(self.config.base_url.clone()),
            model: Some(self.config.model.clone()),
            supports_tools: true,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.config.url("models"))
            .bearer_auth(&self.config.api_key)
            .send()
            .await;

        match response {
            Ok(r) => Ok(r.status().is_success()),
            Err(e) => {
                tracing::warn!("OpenAI health check failed: {}", e);
                Ok(false)
            }
        }
    }

    async fn complete(&self, request: CompletionRequest<'_>) -> Result<Completion> {
        let body = Self::request_body(&request);

        tracing::debug!(
            model = %request.options.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            tool_choice = ?request.tool_choice,
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.config.url("chat/completions"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let api_response: ApiResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {}", e)))?;

        Self::convert_response(api_response)
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiToolCall {
    pub id: String,
    #[serde(default = "function_type")]
    pub r#type: String,
    pub function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApiFunction {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use turn_core::provider::GenerationOptions;
    use turn_core::tool::{EchoTool, ToolResult, TypedTool};

    #[test]
    fn test_config_defaults() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.url("/chat/completions"), "https://api.openai.com/v1/chat/completions");
    }

    #[test]
    fn test_message_conversion_carries_call_ids() {
        let call = ToolCall::new("call_1", "echo", json!({"x": "hi"}));
        let result = ToolResult::success("echo", json!({"x": "hi"})).with_id("call_1");
        let messages = vec![
            Message::system("You are helpful."),
            Message::user("echo hi"),
            Message::assistant_calls("", vec![call]),
            Message::tool_result(&result),
        ];

        let converted = OpenAiChatProvider::api_messages(&messages);
        assert_eq!(converted.len(), 4);
        assert_eq!(converted[2].role, "assistant");
        assert!(converted[2].content.is_none());

        let calls = converted[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].function.arguments, r#"{"x":"hi"}"#);

        assert_eq!(converted[3].role, "tool");
        assert_eq!(converted[3].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(converted[3].content.as_deref(), Some(r#"{"x":"hi"}"#));
    }

    #[test]
    fn test_request_body_tool_choice() {
        let messages = vec![Message::user("hi")];
        let tools = vec![EchoTool.schema()];
        let options = GenerationOptions::default();

        let body = OpenAiChatProvider::request_body(&CompletionRequest {
            messages: &messages,
            tools: &tools,
            tool_choice: ToolChoice::None,
            options: &options,
        });
        assert_eq!(body["tool_choice"], "none");
        assert_eq!(body["tools"][0]["function"]["name"], "echo");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["x"]));

        let body = OpenAiChatProvider::request_body(&CompletionRequest {
            messages: &messages,
            tools: &[],
            tool_choice: ToolChoice::Auto,
            options: &options,
        });
        assert!(body.get("tools").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn test_response_with_tool_calls() {
        let raw = json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });

        let completion = OpenAiChatProvider::convert_response(serde_json::from_value(raw).unwrap()).unwrap();

        assert!(completion.has_tool_calls());
        assert_eq!(completion.tool_calls[0].id, "call_abc");
        assert_eq!(completion.tool_calls[0].arguments, json!({"city": "Paris"}));
        assert_eq!(completion.finish_reason, Some(FinishReason::ToolUse));
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_malformed_arguments_kept_as_string() {
        assert_eq!(decode_arguments("{not json"), json!("{not json"));
        assert_eq!(decode_arguments(""), json!({}));
    }

    #[test]
    fn test_empty_choices_is_error() {
        let raw = json!({"model": "m", "choices": []});
        let err = OpenAiChatProvider::convert_response(serde_json::from_value(raw).unwrap()).unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}
