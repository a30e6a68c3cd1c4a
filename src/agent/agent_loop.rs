//! Agent loop for answering questions with the SQL tools.
//!
//! The loop is an explicit state machine:
//! - THINK: ask the model for the next message
//! - ACT: run the next queued tool call through the policy and registry
//! - OBSERVE: append the tool result to the history
//! - DONE / FAILED: terminal
//!
//! Every transition that changes the conversation yields an [`AgentStep`]
//! snapshot. Dropping the stream cancels the run.

use crate::agent::policy::ToolPolicy;
use crate::agent::prompt::PromptTemplate;
use crate::agent::tools::{ToolRegistry, ToolResult};
use crate::error::{Error, Result};
use crate::llm::{ChatMessage, ChatModel, ToolCall, ToolDefinition};
use crate::models::{AgentStep, StepContent, StepMessage};
use async_stream::try_stream;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Configuration for the agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Default result limit written into the prompt.
    pub row_limit: usize,
    /// Maximum number of model calls per question.
    pub max_iterations: usize,
    /// Wall-clock budget per question.
    pub deadline: Duration,
    /// Enforce list-tables-first and schema-before-query ordering.
    pub enforce_policy: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            row_limit: 5,
            max_iterations: 25,
            deadline: Duration::from_secs(300),
            enforce_policy: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Think,
    Act,
    Observe,
    Done,
    Failed,
}

pub type StepStream<'a> = Pin<Box<dyn Stream<Item = Result<AgentStep>> + Send + 'a>>;

/// The SQL question-answering agent.
pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    registry: Arc<ToolRegistry>,
    tool_definitions: Vec<ToolDefinition>,
    system_prompt: String,
    config: AgentConfig,
}

impl AgentLoop {
    pub fn new(
        model: Arc<dyn ChatModel>,
        registry: Arc<ToolRegistry>,
        template: &PromptTemplate,
        config: AgentConfig,
    ) -> Self {
        info!(
            "Initializing agent with model {} and {} tools",
            model.name(),
            registry.len()
        );
        if registry.is_empty() {
            warn!("Agent has no tools; it can only answer from the prompt");
        }

        Self {
            tool_definitions: registry.definitions(),
            system_prompt: template.render(),
            model,
            registry,
            config,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn remaining(&self, started: Instant) -> Option<Duration> {
        self.config
            .deadline
            .checked_sub(started.elapsed())
            .filter(|d| !d.is_zero())
    }

    fn deadline_error(&self) -> Error {
        Error::Agent(format!(
            "no final answer within the {}s deadline",
            self.config.deadline.as_secs()
        ))
    }

    /// Answer `question`, yielding a snapshot after each transition.
    ///
    /// Each call starts from a fresh history. On failure the stream yields
    /// one `Err(Error::Agent)` and ends.
    pub fn stream<'a>(&'a self, question: &str) -> StepStream<'a> {
        let question = question.to_string();

        Box::pin(try_stream! {
            let started = Instant::now();
            let mut history = vec![
                ChatMessage::system(self.system_prompt.clone()),
                ChatMessage::user(question.clone()),
            ];
            let mut step = AgentStep::new(vec![StepMessage::user(question)]);
            let mut policy = ToolPolicy::new(self.config.enforce_policy);
            let mut pending: VecDeque<ToolCall> = VecDeque::new();
            let mut observation: Option<(ToolCall, ToolResult)> = None;
            let mut failure: Option<Error> = None;
            let mut iterations = 0;
            let mut state = AgentState::Think;

            yield step.clone();

            loop {
                debug!("Agent state: {:?}", state);
                match state {
                    AgentState::Think => {
                        if iterations >= self.config.max_iterations {
                            failure = Some(Error::Agent(format!(
                                "no final answer after {} reasoning steps",
                                iterations
                            )));
                            state = AgentState::Failed;
                            continue;
                        }
                        let Some(remaining) = self.remaining(started) else {
                            failure = Some(self.deadline_error());
                            state = AgentState::Failed;
                            continue;
                        };

                        iterations += 1;
                        debug!("Agent iteration {}", iterations);

                        let reply = tokio::time::timeout(
                            remaining,
                            self.model.chat(&history, &self.tool_definitions),
                        )
                        .await;
                        let reply = match reply {
                            Ok(Ok(reply)) => reply,
                            Ok(Err(e)) => {
                                failure = Some(as_agent_error(e));
                                state = AgentState::Failed;
                                continue;
                            }
                            Err(_) => {
                                failure = Some(self.deadline_error());
                                state = AgentState::Failed;
                                continue;
                            }
                        };

                        step.messages.push(step_message(&reply));
                        pending.extend(reply.tool_calls.iter().cloned());
                        history.push(reply);
                        yield step.clone();

                        state = if pending.is_empty() {
                            AgentState::Done
                        } else {
                            AgentState::Act
                        };
                    }
                    AgentState::Act => {
                        let Some(call) = pending.pop_front() else {
                            state = AgentState::Think;
                            continue;
                        };

                        let result = match policy.check(&call.name) {
                            Err(reason) => {
                                warn!("Tool call {} rejected by policy", call.name);
                                ToolResult::error(reason)
                            }
                            Ok(()) => {
                                let Some(remaining) = self.remaining(started) else {
                                    failure = Some(self.deadline_error());
                                    state = AgentState::Failed;
                                    continue;
                                };
                                match tokio::time::timeout(remaining, self.registry.execute(&call))
                                    .await
                                {
                                    Ok(result) => result,
                                    Err(_) => {
                                        failure = Some(self.deadline_error());
                                        state = AgentState::Failed;
                                        continue;
                                    }
                                }
                            }
                        };

                        if result.success {
                            policy.record(&call.name);
                        }
                        info!(
                            "Tool {} executed ({})",
                            call.name,
                            if result.success { "ok" } else { "error" }
                        );
                        observation = Some((call, result));
                        state = AgentState::Observe;
                    }
                    AgentState::Observe => {
                        if let Some((call, result)) = observation.take() {
                            let text = result.observation();
                            history.push(ChatMessage::tool_result(&call, text.clone()));
                            step.messages.push(StepMessage::tool(call.name, text));
                            yield step.clone();
                        }
                        state = if pending.is_empty() {
                            AgentState::Think
                        } else {
                            AgentState::Act
                        };
                    }
                    AgentState::Done => {
                        info!(
                            "Agent finished after {} reasoning steps in {:.1}s",
                            iterations,
                            started.elapsed().as_secs_f64()
                        );
                        break;
                    }
                    AgentState::Failed => {
                        let error = failure
                            .take()
                            .unwrap_or_else(|| Error::Agent("agent run failed".to_string()));
                        warn!("Agent run failed: {}", error);
                        Err::<(), Error>(error)?;
                        break;
                    }
                }
            }
        })
    }
}

/// Step message for an assistant reply. Content blocks are kept as
/// structured content when the reply carried no plain text.
fn step_message(reply: &ChatMessage) -> StepMessage {
    let content = match &reply.blocks {
        Some(blocks) if reply.content.is_empty() => StepContent::Structured(blocks.clone()),
        _ => StepContent::Text(reply.content.clone()),
    };
    StepMessage::agent(content, reply.tool_calls.clone())
}

fn as_agent_error(error: Error) -> Error {
    match error {
        Error::Agent(_) => error,
        other => Error::Agent(other.to_string()),
    }
}
