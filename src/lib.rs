//! # Jira Assistant
//!
//! A chat assistant that answers questions about Jira issues by letting a
//! language model call Jira tools.
//!
//! This library provides:
//! - A prompt-driven tool loop for models without native function calling
//! - Jira tools (search, details, analysis, project info, issue creation)
//! - OpenAI-compatible, Ollama and LLM-farm clients
//! - An HTTP API with in-memory chat sessions
//!
//! ## Architecture
//!
//! The agent follows the "tools in a loop" pattern:
//! 1. Receive a user message via the API
//! 2. Build context with the system prompt, tool catalogue and history
//! 3. Call the model, parse `TOOL_CALL:` invocations, run the tools
//! 4. Feed results back to the model, repeat until it answers in plain text
//!
//! ## Example
//!
//! ```rust,ignore
//! use jira_assistant::{agent::ChatSession, api::AppState, config::Config};
//!
//! let config = Config::from_env()?;
//! let state = AppState::from_config(&config)?;
//! let mut session = ChatSession::new(state.llm, state.registry, config.agent);
//! let reply = session.submit("Show me all To Do issues").await;
//! println!("{}", reply.text);
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod jira;
pub mod llm;
pub mod tools;

pub use config::Config;
