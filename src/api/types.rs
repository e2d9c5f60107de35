//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AbortReason, ConversationTurn, LoopState, Outcome};

/// Request to send a chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageRequest {
    pub message: String,
}

/// Id of a freshly created session.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSessionResponse {
    pub id: Uuid,
}

/// How a message was handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    /// The model produced a final answer
    Done,
    /// Tool-call rounds hit the configured cap
    IterationCap,
    /// The model call failed
    LlmFailure,
    Cancelled,
    /// Answered locally by a chat command
    Command,
}

/// Assistant answer to one chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub reply: String,
    pub outcome: ReplyStatus,
    pub tool_rounds: usize,

    /// Failure detail for `llm_failure`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChatResponse {
    /// Reply produced by a chat command rather than the model.
    pub fn command(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            outcome: ReplyStatus::Command,
            tool_rounds: 0,
            error: None,
        }
    }
}

impl From<crate::agent::Reply> for ChatResponse {
    fn from(reply: crate::agent::Reply) -> Self {
        let (outcome, error) = match reply.outcome {
            Outcome::Done => (ReplyStatus::Done, None),
            Outcome::Aborted(AbortReason::IterationCap) => (ReplyStatus::IterationCap, None),
            Outcome::Aborted(AbortReason::LlmFailure(e)) => (ReplyStatus::LlmFailure, Some(e)),
            Outcome::Aborted(AbortReason::Cancelled) => (ReplyStatus::Cancelled, None),
        };
        Self {
            reply: reply.text,
            outcome,
            tool_rounds: reply.tool_rounds,
            error,
        }
    }
}

/// Snapshot of a session's conversation.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub state: LoopState,
    pub max_turns: usize,
    /// Non-system turns, oldest first
    pub turns: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    /// False when no turn was running
    pub cancelled: bool,
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Jira connectivity and assistant configuration.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    /// "healthy" or "error"
    pub status: String,
    pub jira_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessible_projects: Option<usize>,
    pub project_scope: String,
    pub llm_provider: String,
    pub model: String,
    pub tools: Vec<String>,
    pub sessions: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    /// Chat-friendly rendering used by the `status` command.
    pub fn to_message(&self) -> String {
        match &self.error {
            None => format!(
                "**System Status: Healthy**\n\n\
                 - Jira connection: connected\n\
                 - Accessible projects: {}\n\
                 - Project scope: {}\n\
                 - Model: {} ({})\n\
                 - Available tools: {}\n\n\
                 Ready to help with your Jira issues!",
                self.accessible_projects.unwrap_or(0),
                self.project_scope,
                self.model,
                self.llm_provider,
                self.tools.len()
            ),
            Some(error) => format!("**System Status: Error**\n\nError: {}", error),
        }
    }
}
