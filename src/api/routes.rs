//! HTTP handlers for health, status and chat sessions.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::sessions::SessionEntry;
use super::types::{
    CancelResponse, ChatResponse, CreateSessionResponse, HealthResponse, HistoryResponse,
    SendMessageRequest, StatusResponse,
};
use super::AppState;
use crate::agent::{help_text, SystemCommand, CLEARED_MESSAGE};

/// Look up a session, returning 404 if it does not exist.
async fn require_session(
    state: &AppState,
    id: Uuid,
) -> Result<Arc<SessionEntry>, (StatusCode, String)> {
    state
        .sessions
        .get(id)
        .await
        .ok_or((StatusCode::NOT_FOUND, format!("Session {} not found", id)))
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Probe Jira and report what the assistant is wired to.
pub async fn system_status(state: &AppState) -> StatusResponse {
    let (jira_connected, accessible_projects, error) = match state.tracker.projects().await {
        Ok(projects) => (true, Some(projects.len()), None),
        Err(e) => {
            tracing::warn!("Jira status check failed: {}", e);
            (false, None, Some(e.to_string()))
        }
    };

    StatusResponse {
        status: if jira_connected { "healthy" } else { "error" }.to_string(),
        jira_connected,
        accessible_projects,
        project_scope: state
            .tracker
            .project_scope()
            .unwrap_or("All projects")
            .to_string(),
        llm_provider: state.llm.name().to_string(),
        model: state.llm.model().to_string(),
        tools: state.registry.names(),
        sessions: state.sessions.len().await,
        error,
    }
}

pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    Json(system_status(&state).await)
}

pub async fn create_session(State(state): State<Arc<AppState>>) -> Json<CreateSessionResponse> {
    let id = state.sessions.create().await;
    Json(CreateSessionResponse { id })
}

/// Send a user message to a session and wait for the assistant's answer.
///
/// Chat commands (`help`, `clear history`, `status`) are answered here
/// without calling the model.
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let entry = require_session(&state, id).await?;

    if let Some(command) = SystemCommand::parse(message) {
        tracing::info!(session = %id, command = ?command, "Handling chat command");
        let reply = match command {
            SystemCommand::Help => help_text(&state.registry),
            SystemCommand::ClearHistory => {
                entry.lock().await.reset();
                CLEARED_MESSAGE.to_string()
            }
            SystemCommand::Status => system_status(&state).await.to_message(),
        };
        return Ok(Json(ChatResponse::command(reply)));
    }

    tracing::info!(session = %id, message_len = message.len(), "Received chat message");
    let reply = entry.submit(message).await;
    Ok(Json(reply.into()))
}

/// Current conversation of a session, without the system prompt.
pub async fn history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryResponse>, (StatusCode, String)> {
    let entry = require_session(&state, id).await?;
    let session = entry.lock().await;
    let conversation = session.conversation();
    Ok(Json(HistoryResponse {
        id,
        created_at: entry.created_at,
        state: session.state(),
        max_turns: conversation.max_turns(),
        turns: conversation.history().to_vec(),
    }))
}

/// Clear a session's history, waiting for any running turn first.
pub async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    let entry = require_session(&state, id).await?;
    entry.lock().await.reset();
    Ok(StatusCode::NO_CONTENT)
}

/// Cancel the running turn of a session, if any.
pub async fn cancel_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CancelResponse>, (StatusCode, String)> {
    let entry = require_session(&state, id).await?;
    let cancelled = entry.cancel().await;
    Ok(Json(CancelResponse { cancelled }))
}

/// Remove a session and cancel its running turn.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    if state.sessions.remove(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Session {} not found", id)))
    }
}
