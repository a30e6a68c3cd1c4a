//! Data models shared across the application.
//!
//! This module contains the secret wrapper used for credentials and the
//! step structures the agent loop yields to the presenter.

use crate::llm::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A credential that must never appear in logs or terminal output.
///
/// `Debug` and `Display` both print `****`; use [`Secret::expose`] to
/// read the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the underlying value.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "****")
    }
}

impl FromStr for Secret {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Author of a message in an agent step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Agent => write!(f, "Agent"),
            Role::Tool => write!(f, "Tool"),
        }
    }
}

impl Role {
    /// Returns an emoji representation of the role.
    pub fn emoji(&self) -> &'static str {
        match self {
            Role::User => "🧑",
            Role::Agent => "🤖",
            Role::Tool => "🔧",
        }
    }
}

/// Message content: plain text, or a structured payload as returned by
/// some providers (content blocks).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepContent {
    Text(String),
    Structured(Value),
}

impl From<&str> for StepContent {
    fn from(s: &str) -> Self {
        StepContent::Text(s.to_string())
    }
}

impl From<String> for StepContent {
    fn from(s: String) -> Self {
        StepContent::Text(s)
    }
}

/// A single message inside an agent step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepMessage {
    pub role: Role,
    pub content: StepContent,
    /// Tool calls proposed by the agent in this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Name of the tool that produced this message (tool role only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl StepMessage {
    pub fn user(content: impl Into<StepContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: Vec::new(),
            name: None,
        }
    }

    pub fn agent(content: impl Into<StepContent>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Agent,
            content: content.into(),
            tool_calls,
            name: None,
        }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<StepContent>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            name: Some(name.into()),
        }
    }
}

/// Snapshot of the conversation after one agent transition.
///
/// Messages are ordered oldest first; the last one is the newest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStep {
    pub messages: Vec<StepMessage>,
}

impl AgentStep {
    pub fn new(messages: Vec<StepMessage>) -> Self {
        Self { messages }
    }

    /// The most recent message, if any.
    pub fn latest(&self) -> Option<&StepMessage> {
        self.messages.last()
    }
}
