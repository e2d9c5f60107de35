//! Agent module - the prompt-driven tool orchestration core.
//!
//! The model has no native function calling, so tools are requested in plain
//! text with a `TOOL_CALL:` marker:
//! 1. Build context with the system prompt (tool catalogue) and the history
//! 2. Call the model and scan its reply for invocations
//! 3. Dispatch each invocation and feed the results back as tool turns
//! 4. Repeat until the model answers without invocations or the round cap hits

mod agent_loop;
mod commands;
mod conversation;
mod dispatcher;
mod parser;
mod prompt;

pub use agent_loop::{AbortReason, ChatSession, LoopState, Outcome, Reply};
pub use commands::{help_text, SystemCommand, CLEARED_MESSAGE};
pub use conversation::{Conversation, ConversationTurn, TurnRole};
pub use dispatcher::{DispatchError, Dispatcher, ToolOutcome, ToolResult};
pub use parser::{parse_invocations, Invocations, ParsedInvocation, MARKER};
pub use prompt::{build_system_prompt, compile};
