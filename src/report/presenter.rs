//! Terminal rendering of agent steps.
//!
//! Each step is a full snapshot; only its most recent message is shown.
//! Content that does not have the expected shape is reported as an
//! unexpected format rather than aborting the session.

use crate::models::{AgentStep, Role, StepContent, StepMessage};
use serde_json::Value;

/// A rendered message, or the reason it could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    Message {
        role: Role,
        name: Option<String>,
        text: String,
    },
    Unexpected(String),
}

/// Render the most recent message of a step.
pub fn render_latest(step: &AgentStep) -> Rendered {
    match step.latest() {
        Some(message) => render_message(message),
        None => Rendered::Unexpected(
            "Unexpected response format: the step contains no messages".to_string(),
        ),
    }
}

/// Render one message: its text followed by one line per tool call.
pub fn render_message(message: &StepMessage) -> Rendered {
    let text = match &message.content {
        StepContent::Text(text) => text.clone(),
        StepContent::Structured(value) => match blocks_text(value) {
            Some(text) => text,
            None => {
                return Rendered::Unexpected(format!(
                    "Unexpected response format: {}",
                    value
                ))
            }
        },
    };

    let mut lines: Vec<String> = Vec::new();
    if !text.trim().is_empty() {
        lines.push(text.trim_end().to_string());
    }
    for call in &message.tool_calls {
        lines.push(format!("→ {}({})", call.name, call.arguments));
    }

    Rendered::Message {
        role: message.role,
        name: message.name.clone(),
        text: lines.join("\n"),
    }
}

/// Join the `text` of every block in a content-block array. Any block
/// without a string `text` key makes the whole payload unreadable.
fn blocks_text(value: &Value) -> Option<String> {
    let blocks = value.as_array()?;
    let parts: Option<Vec<&str>> = blocks
        .iter()
        .map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    Some(parts?.join(""))
}

/// The agent's final answer: the latest message, when it is an agent
/// message without tool calls.
pub fn final_answer(step: &AgentStep) -> Option<String> {
    let message = step.latest()?;
    if message.role != Role::Agent || !message.tool_calls.is_empty() {
        return None;
    }
    match render_message(message) {
        Rendered::Message { text, .. } => Some(text),
        Rendered::Unexpected(_) => None,
    }
}

/// Formats steps for the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepPresenter {
    answer_only: bool,
}

impl StepPresenter {
    pub fn new(answer_only: bool) -> Self {
        Self { answer_only }
    }

    /// Text to print for an intermediate step. The final answer is left
    /// to [`StepPresenter::format_final`]; nothing is shown in answer-only
    /// mode.
    pub fn format_step(&self, step: &AgentStep) -> Option<String> {
        if self.answer_only || final_answer(step).is_some() {
            return None;
        }
        Some(format_rendered(&render_latest(step)))
    }

    /// Text to print once the run has finished.
    pub fn format_final(&self, step: &AgentStep) -> String {
        match final_answer(step) {
            Some(answer) if self.answer_only => answer,
            Some(answer) => format!("✅ Answer:\n{}", answer),
            None => format_rendered(&render_latest(step)),
        }
    }
}

fn format_rendered(rendered: &Rendered) -> String {
    match rendered {
        Rendered::Message { role, name, text } => {
            let header = match name {
                Some(name) => format!("{} {} ({})", role.emoji(), role, name),
                None => format!("{} {}", role.emoji(), role),
            };
            if text.is_empty() {
                header
            } else {
                format!("{}\n{}", header, indent(text))
            }
        }
        Rendered::Unexpected(reason) => format!("⚠️  {}", reason),
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| format!("   {}", line))
        .collect::<Vec<_>>()
        .join("\n")
}
