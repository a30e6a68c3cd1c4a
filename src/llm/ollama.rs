//! Ollama chat provider (`POST {api_url}/api/chat`).

use crate::error::{Error, Result};
use crate::llm::{
    ensure_success, http_client, send_error, ChatMessage, ChatModel, ChatRole, ModelSettings,
    ToolCall, ToolDefinition,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Ollama chat API request.
#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolDefinition],
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Ollama chat API response.
#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessage,
}

/// Chat model served by a local Ollama instance.
pub struct OllamaModel {
    model: String,
    api_url: String,
    temperature: f32,
    timeout_seconds: u64,
    http_client: reqwest::Client,
    /// Ollama does not assign call ids, so we number them ourselves.
    next_call_id: AtomicUsize,
}

impl OllamaModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            model: settings.model.clone(),
            api_url: settings.api_url.trim_end_matches('/').to_string(),
            temperature: settings.temperature,
            timeout_seconds: settings.timeout_seconds,
            http_client: http_client(settings.timeout_seconds)?,
            next_call_id: AtomicUsize::new(0),
        })
    }

    fn from_response(&self, message: OllamaMessage) -> ChatMessage {
        let tool_calls = message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|call| ToolCall {
                id: format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed)),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect();
        ChatMessage::assistant(message.content, tool_calls)
    }
}

fn to_wire(message: &ChatMessage) -> OllamaMessage {
    let role = match message.role {
        ChatRole::System => "system",
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
        ChatRole::Tool => "tool",
    };
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunction {
                        name: call.name.clone(),
                        arguments: call.arguments.clone(),
                    },
                })
                .collect(),
        )
    };

    OllamaMessage {
        role: role.to_string(),
        content: message.content.clone(),
        tool_calls,
        tool_name: message.tool_name.clone(),
    }
}

#[async_trait]
impl ChatModel for OllamaModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatMessage> {
        let url = format!("{}/api/chat", self.api_url);

        let request = OllamaChatRequest {
            model: &self.model,
            messages: messages.iter().map(to_wire).collect(),
            tools,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        };

        debug!("Sending Ollama chat request with {} messages", messages.len());

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(e, "Ollama", &self.api_url, self.timeout_seconds))?;
        let response = ensure_success(response, "Ollama").await?;

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Agent(format!("failed to parse Ollama response: {}", e)))?;

        Ok(self.from_response(chat_response.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Provider;
    use serde_json::json;

    fn model() -> OllamaModel {
        OllamaModel::new(&ModelSettings {
            provider: Provider::Ollama,
            model: "llama3.1:latest".to_string(),
            api_url: "http://localhost:11434/".to_string(),
            api_key: None,
            temperature: 0.0,
            timeout_seconds: 10,
        })
        .unwrap()
    }

    #[test]
    fn test_trailing_slash_trimmed() {
        assert_eq!(model().api_url, "http://localhost:11434");
    }

    #[test]
    fn test_tool_message_wire_format() {
        let call = ToolCall {
            id: "call_0".to_string(),
            name: "sql_db_schema".to_string(),
            arguments: json!({"table_names": "orders"}),
        };
        let wire = serde_json::to_value(to_wire(&ChatMessage::tool_result(&call, "CREATE TABLE")))
            .unwrap();
        assert_eq!(
            wire,
            json!({"role": "tool", "content": "CREATE TABLE", "tool_name": "sql_db_schema"})
        );

        let wire = serde_json::to_value(to_wire(&ChatMessage::assistant("", vec![call]))).unwrap();
        assert_eq!(
            wire["tool_calls"][0]["function"]["arguments"]["table_names"],
            "orders"
        );
    }

    #[test]
    fn test_response_assigns_call_ids() {
        let response: OllamaChatResponse = serde_json::from_value(json!({
            "model": "llama3.1:latest",
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [
                    {"function": {"name": "sql_db_list_tables", "arguments": {}}},
                    {"function": {"name": "sql_db_schema", "arguments": {"table_names": "orders"}}}
                ]
            },
            "done": true
        }))
        .unwrap();

        let model = model();
        let message = model.from_response(response.message);
        assert_eq!(message.role, ChatRole::Assistant);
        let ids: Vec<&str> = message.tool_calls.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["call_0", "call_1"]);
        assert_eq!(message.tool_calls[1].name, "sql_db_schema");
    }
}
