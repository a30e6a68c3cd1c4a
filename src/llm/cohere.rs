//! Cohere v2 chat provider (`POST {api_url}/v2/chat`).
//!
//! Tool-call arguments travel as JSON-encoded strings on this API, and the
//! assistant's text arrives as a list of typed content blocks.

use crate::error::{Error, Result};
use crate::llm::{
    ensure_success, http_client, send_error, ChatMessage, ChatModel, ChatRole, ModelSettings,
    ToolCall, ToolDefinition,
};
use crate::models::Secret;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct CohereChatRequest<'a> {
    model: &'a str,
    messages: Vec<CohereMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CohereMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_plan: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<CohereToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CohereToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: CohereFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CohereFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize)]
struct CohereChatResponse {
    #[serde(default)]
    finish_reason: Option<String>,
    message: CohereResponseMessage,
}

#[derive(Debug, Deserialize)]
struct CohereResponseMessage {
    #[serde(default)]
    content: Vec<Value>,
    #[serde(default)]
    tool_plan: Option<String>,
    #[serde(default)]
    tool_calls: Vec<CohereToolCall>,
}

/// Chat model hosted by Cohere.
pub struct CohereModel {
    model: String,
    api_url: String,
    api_key: Secret,
    temperature: f32,
    timeout_seconds: u64,
    http_client: reqwest::Client,
}

impl CohereModel {
    pub fn new(settings: &ModelSettings, api_key: Secret) -> Result<Self> {
        Ok(Self {
            model: settings.model.clone(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            api_key,
            temperature: settings.temperature,
            timeout_seconds: settings.timeout_seconds,
            http_client: http_client(settings.timeout_seconds)?,
        })
    }
}

fn to_wire(message: &ChatMessage) -> CohereMessage {
    let mut wire = CohereMessage {
        role: "user",
        content: Some(message.content.clone()),
        tool_plan: None,
        tool_calls: Vec::new(),
        tool_call_id: None,
    };

    match message.role {
        ChatRole::System => wire.role = "system",
        ChatRole::User => {}
        ChatRole::Assistant if message.tool_calls.is_empty() => wire.role = "assistant",
        ChatRole::Assistant => {
            wire.role = "assistant";
            wire.content = None;
            wire.tool_plan = Some(message.content.clone()).filter(|plan| !plan.is_empty());
            wire.tool_calls = message
                .tool_calls
                .iter()
                .map(|call| CohereToolCall {
                    id: call.id.clone(),
                    call_type: function_type(),
                    function: CohereFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect();
        }
        ChatRole::Tool => {
            wire.role = "tool";
            wire.tool_call_id = message.tool_call_id.clone();
        }
    }

    wire
}

fn from_response(response: CohereChatResponse) -> Result<ChatMessage> {
    match response.finish_reason.as_deref() {
        Some("ERROR") => {
            return Err(Error::Agent(
                "Cohere reported an error while generating the reply".to_string(),
            ))
        }
        Some("MAX_TOKENS") => warn!("Cohere reply was cut off at the token limit"),
        _ => {}
    }

    let message = response.message;

    let text: Vec<&str> = message
        .content
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    let mut content = text.join("");

    let tool_calls: Vec<ToolCall> = message
        .tool_calls
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            arguments: parse_arguments(&call.function.name, &call.function.arguments),
            name: call.function.name,
        })
        .collect();

    if content.is_empty() && !tool_calls.is_empty() {
        content = message.tool_plan.unwrap_or_default();
    }

    let mut reply = ChatMessage::assistant(content, tool_calls);
    if reply.content.is_empty() && !message.content.is_empty() {
        reply.blocks = Some(Value::Array(message.content));
    }
    Ok(reply)
}

fn parse_arguments(tool: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Arguments for {} are not valid JSON ({}); passing them through", tool, e);
        Value::String(raw.to_string())
    })
}

#[async_trait]
impl ChatModel for CohereModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatMessage> {
        let url = format!("{}/v2/chat", self.api_url);

        let request = CohereChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools,
            temperature: self.temperature,
        };

        debug!("Sending Cohere chat request with {} messages", messages.len());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, "Cohere", &self.api_url, self.timeout_seconds))?;
        let response = ensure_success(response, "Cohere").await?;

        let chat_response: CohereChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("failed to parse Cohere response: {}", e)))?;

        from_response(chat_response)
    }
}
