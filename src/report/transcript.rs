//! Session transcript generation.
//!
//! Records every question of a session and renders the record as Markdown
//! or JSON when the session ends.

use crate::models::{AgentStep, StepMessage};
use crate::report::presenter::{final_answer, render_message, Rendered};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Session-level facts shown at the top of the transcript.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptMetadata {
    /// Connection URI with the password masked.
    pub connection: String,
    pub dialect: String,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// One question and what the agent did with it.
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub question: String,
    pub asked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub steps: Vec<StepMessage>,
}

impl Exchange {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            asked_at: Utc::now(),
            answer: None,
            error: None,
            steps: Vec::new(),
        }
    }

    /// Keep the latest snapshot; the answer is taken from it.
    pub fn update(&mut self, step: &AgentStep) {
        self.steps = step.messages.clone();
        self.answer = final_answer(step);
    }

    pub fn fail(&mut self, error: impl ToString) {
        self.answer = None;
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Transcript {
    pub metadata: TranscriptMetadata,
    pub exchanges: Vec<Exchange>,
}

impl Transcript {
    pub fn new(connection: String, dialect: String, model: String) -> Self {
        Self {
            metadata: TranscriptMetadata {
                connection,
                dialect,
                model,
                started_at: Utc::now(),
                duration_seconds: 0.0,
            },
            exchanges: Vec::new(),
        }
    }

    pub fn record(&mut self, exchange: Exchange) {
        self.exchanges.push(exchange);
    }

    /// Stamp the session duration.
    pub fn finish(&mut self) {
        let elapsed = Utc::now() - self.metadata.started_at;
        self.metadata.duration_seconds = elapsed.num_milliseconds() as f64 / 1000.0;
    }
}

/// Generate a complete Markdown transcript.
pub fn generate_markdown_transcript(transcript: &Transcript) -> String {
    let mut output = String::new();

    output.push_str("# pgask Transcript\n\n");
    output.push_str(&generate_session_section(transcript));
    output.push_str(&generate_table_of_contents(&transcript.exchanges));

    for (index, exchange) in transcript.exchanges.iter().enumerate() {
        output.push_str(&generate_exchange_section(index + 1, exchange));
    }

    output.push_str("---\n\n");
    output.push_str("*Transcript generated by pgask*\n");

    output
}

fn generate_session_section(transcript: &Transcript) -> String {
    let metadata = &transcript.metadata;
    let mut section = String::new();

    section.push_str("## Session\n\n");
    section.push_str(&format!("- **Database:** `{}`\n", metadata.connection));
    section.push_str(&format!("- **Dialect:** {}\n", metadata.dialect));
    section.push_str(&format!("- **Model:** `{}`\n", metadata.model));
    section.push_str(&format!(
        "- **Started:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push_str(&format!(
        "- **Questions:** {}\n\n",
        transcript.exchanges.len()
    ));

    section
}

fn generate_table_of_contents(exchanges: &[Exchange]) -> String {
    if exchanges.is_empty() {
        return String::new();
    }

    let mut toc = String::new();
    toc.push_str("## Questions\n\n");
    for (index, exchange) in exchanges.iter().enumerate() {
        let status = if exchange.error.is_some() { "❌" } else { "✅" };
        toc.push_str(&format!(
            "- {} [{}](#question-{})\n",
            status,
            exchange.question.lines().next().unwrap_or_default(),
            index + 1
        ));
    }
    toc.push('\n');

    toc
}

fn generate_exchange_section(number: usize, exchange: &Exchange) -> String {
    let mut section = String::new();

    section.push_str(&format!("## Question {}\n\n", number));
    for line in exchange.question.lines() {
        section.push_str(&format!("> {}\n", line));
    }
    section.push_str(&format!(
        "\n*Asked at {}*\n\n",
        exchange.asked_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if !exchange.steps.is_empty() {
        section.push_str("### Steps\n\n");
        for message in &exchange.steps {
            section.push_str(&generate_step_block(message));
        }
    }

    if let Some(ref answer) = exchange.answer {
        section.push_str("### Answer\n\n");
        section.push_str(answer);
        section.push_str("\n\n");
    }

    if let Some(ref error) = exchange.error {
        section.push_str("### Error\n\n");
        section.push_str(&format!("```text\n{}\n```\n\n", error));
    }

    section
}

fn generate_step_block(message: &StepMessage) -> String {
    let header = match &message.name {
        Some(name) => format!("**{} {}** `{}`", message.role.emoji(), message.role, name),
        None => format!("**{} {}**", message.role.emoji(), message.role),
    };

    let body = match render_message(message) {
        Rendered::Message { text, .. } => text,
        Rendered::Unexpected(reason) => reason,
    };

    if body.is_empty() {
        format!("{}\n\n", header)
    } else {
        format!("{}\n\n```text\n{}\n```\n\n", header, body)
    }
}

/// Generate a JSON transcript.
pub fn generate_json_transcript(transcript: &Transcript) -> Result<String> {
    serde_json::to_string_pretty(transcript).map_err(Into::into)
}
