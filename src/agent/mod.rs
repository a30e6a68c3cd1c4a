//! The SQL agent.
//!
//! This module provides the tools, the instruction prompt, the ordering
//! policy and the agent loop that ties them to a chat model.

pub mod agent_loop;
pub mod policy;
pub mod prompt;
pub mod tools;

pub use agent_loop::{AgentConfig, AgentLoop};
pub use prompt::PromptTemplate;
pub use tools::ToolRegistry;
