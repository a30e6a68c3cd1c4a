//! Chat model providers.
//!
//! The agent talks to its reasoning capability through the [`ChatModel`]
//! trait. Two HTTP providers are available: Cohere (hosted, keyed by an
//! API key) and Ollama (local).

pub mod cohere;
pub mod ollama;

pub use cohere::CohereModel;
pub use ollama::OllamaModel;

use crate::error::{Error, Result};
use crate::models::Secret;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Author of a chat message, as understood by the providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call proposed by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Message in the chat history.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// For tool results: the id of the call being answered.
    pub tool_call_id: Option<String>,
    /// For tool results: the name of the tool that ran.
    pub tool_name: Option<String>,
    /// Raw content blocks, kept when the provider returned something
    /// other than plain text.
    pub blocks: Option<Value>,
}

impl ChatMessage {
    fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
            blocks: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::new(ChatRole::Assistant, content)
        }
    }

    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::new(ChatRole::Tool, content)
        }
    }
}

/// Tool definition in the function-calling schema shared by Cohere v2 and
/// Ollama.
#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// The reasoning capability behind the agent loop.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model name, for logs and transcripts.
    fn name(&self) -> &str;

    /// Produce the next assistant message given the history and the tools
    /// the model may call.
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition]) -> Result<ChatMessage>;
}

/// Supported chat providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Cohere hosted API (requires an API key)
    #[default]
    Cohere,
    /// Local Ollama server
    Ollama,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::Cohere => "https://api.cohere.com",
            Provider::Ollama => "http://localhost:11434",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Cohere => "command-r-plus",
            Provider::Ollama => "llama3.1:latest",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Provider::Cohere)
    }
}

/// Everything a provider needs, passed explicitly rather than read from
/// the process environment.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub provider: Provider,
    pub model: String,
    pub api_url: String,
    pub api_key: Option<Secret>,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

/// Build the configured provider.
pub fn build_model(settings: &ModelSettings) -> Result<Arc<dyn ChatModel>> {
    match settings.provider {
        Provider::Cohere => {
            let api_key = settings
                .api_key
                .clone()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| Error::Validation("a Cohere API key is required".to_string()))?;
            Ok(Arc::new(CohereModel::new(settings, api_key)?))
        }
        Provider::Ollama => Ok(Arc::new(OllamaModel::new(settings)?)),
    }
}

fn http_client(timeout_seconds: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_seconds))
        .build()
        .map_err(|e| Error::Agent(format!("failed to create HTTP client: {}", e)))
}

/// Describe a transport failure without leaking request details.
fn send_error(e: reqwest::Error, provider: &str, api_url: &str, timeout_seconds: u64) -> Error {
    if e.is_timeout() {
        Error::Agent(format!(
            "{} request timed out after {}s",
            provider, timeout_seconds
        ))
    } else if e.is_connect() {
        Error::Agent(format!("cannot connect to {} at {}", provider, api_url))
    } else {
        Error::Agent(format!("failed to send request to {}: {}", provider, e))
    }
}

/// Turn a non-2xx response into an error carrying the body.
async fn ensure_success(response: reqwest::Response, provider: &str) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Agent(format!("{} API error {}: {}", provider, status, body)))
}


#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: Provider, api_key: Option<&str>) -> ModelSettings {
        ModelSettings {
            provider,
            model: provider.default_model().to_string(),
            api_url: provider.default_url().to_string(),
            api_key: api_key.map(Secret::new),
            temperature: 0.0,
            timeout_seconds: 30,
        }
    }

    #[test]
    fn test_cohere_requires_api_key() {
        let err = build_model(&settings(Provider::Cohere, None)).err().unwrap();
        assert!(matches!(err, Error::Validation(_)));

        let err = build_model(&settings(Provider::Cohere, Some("  "))).err().unwrap();
        assert!(matches!(err, Error::Validation(_)));

        let model = build_model(&settings(Provider::Cohere, Some("key"))).unwrap();
        assert_eq!(model.name(), "command-r-plus");
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let model = build_model(&settings(Provider::Ollama, None)).unwrap();
        assert_eq!(model.name(), "llama3.1:latest");
    }

    #[test]
    fn test_tool_result_links_call() {
        let call = ToolCall {
            id: "call_1".to_string(),
            name: "sql_db_list_tables".to_string(),
            arguments: serde_json::json!({}),
        };
        let message = ChatMessage::tool_result(&call, "orders");
        assert_eq!(message.role, ChatRole::Tool);
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.tool_name.as_deref(), Some("sql_db_list_tables"));
    }
}
