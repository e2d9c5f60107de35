//! HTTP API for the chat front end.
//!
//! Sessions are kept in memory only; restarting the server forgets them.

mod routes;
mod sessions;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    http::Method,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::{AgentConfig, Config};
use crate::jira::{IssueTracker, JiraClient};
use crate::llm::{self, LlmClient};
use crate::tools::{jira_registry, IssueLimits, ToolRegistry};

pub use routes::system_status;
pub use sessions::{SessionEntry, SessionStore};

/// Shared application state: the Jira backend, the model client, the tool
/// registry built over them, and the live chat sessions.
pub struct AppState {
    pub tracker: Arc<dyn IssueTracker>,
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(
        tracker: Arc<dyn IssueTracker>,
        llm: Arc<dyn LlmClient>,
        registry: Arc<ToolRegistry>,
        agent: AgentConfig,
    ) -> Self {
        let sessions = SessionStore::new(Arc::clone(&llm), Arc::clone(&registry), agent);
        Self {
            tracker,
            llm,
            registry,
            sessions,
        }
    }

    /// Wire the Jira client, tool registry and model client from configuration.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let tracker: Arc<dyn IssueTracker> = Arc::new(JiraClient::new(&config.jira)?);
        let registry = Arc::new(jira_registry(
            Arc::clone(&tracker),
            IssueLimits::from(&config.jira),
        )?);
        let llm = llm::from_config(&config.llm)?;
        tracing::info!(
            provider = llm.name(),
            model = llm.model(),
            tools = registry.len(),
            "Assistant initialized"
        );
        Ok(Self::new(tracker, llm, registry, config.agent.clone()))
    }
}

/// All `/api` routes with CORS and request tracing.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/status", get(routes::status))
        .route("/api/sessions", post(routes::create_session))
        .route("/api/sessions/:id", axum::routing::delete(routes::delete_session))
        .route("/api/sessions/:id/messages", post(routes::send_message))
        .route("/api/sessions/:id/history", get(routes::history))
        .route("/api/sessions/:id/reset", post(routes::reset_session))
        .route("/api/sessions/:id/cancel", post(routes::cancel_turn))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the HTTP server and block until shutdown.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let state = Arc::new(AppState::from_config(&config)?);
    state.sessions.spawn_reaper(config.session_idle_timeout);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!("Jira assistant listening on http://{}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
