//! In-memory chat sessions (non-persistent).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agent::{ChatSession, Reply};
use crate::config::AgentConfig;
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

/// One chat session plus the token of its in-flight turn, if any.
pub struct SessionEntry {
    pub created_at: DateTime<Utc>,
    last_used: Mutex<Instant>,
    session: Mutex<ChatSession>,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl SessionEntry {
    fn new(session: ChatSession) -> Self {
        Self {
            created_at: Utc::now(),
            last_used: Mutex::new(Instant::now()),
            session: Mutex::new(session),
            in_flight: Mutex::new(None),
        }
    }

    /// Run one user message. Messages to the same session queue up.
    pub async fn submit(&self, text: &str) -> Reply {
        let mut session = self.session.lock().await;
        let token = CancellationToken::new();
        *self.in_flight.lock().await = Some(token.clone());
        let reply = session.submit_with_cancel(text, &token).await;
        self.in_flight.lock().await.take();
        self.touch().await;
        reply
    }

    /// Cancel the running turn. Returns false when nothing was running.
    pub async fn cancel(&self) -> bool {
        match self.in_flight.lock().await.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Exclusive access to the session, waiting for any running turn.
    pub async fn lock(&self) -> tokio::sync::MutexGuard<'_, ChatSession> {
        let guard = self.session.lock().await;
        self.touch().await;
        guard
    }

    async fn touch(&self) {
        *self.last_used.lock().await = Instant::now();
    }

    /// Idle for at least `max_idle` with no turn running.
    async fn is_idle(&self, max_idle: Duration) -> bool {
        self.in_flight.lock().await.is_none() && self.last_used.lock().await.elapsed() >= max_idle
    }
}

/// All live chat sessions, keyed by id. Every session shares one model
/// client and tool registry.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<SessionEntry>>>>,
    llm: Arc<dyn LlmClient>,
    registry: Arc<ToolRegistry>,
    agent: AgentConfig,
}

impl SessionStore {
    pub fn new(llm: Arc<dyn LlmClient>, registry: Arc<ToolRegistry>, agent: AgentConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            llm,
            registry,
            agent,
        }
    }

    /// Start a new session with an empty history.
    pub async fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let session = ChatSession::new(
            Arc::clone(&self.llm),
            Arc::clone(&self.registry),
            self.agent.clone(),
        );
        self.sessions
            .write()
            .await
            .insert(id, Arc::new(SessionEntry::new(session)));
        tracing::info!(session = %id, "Created chat session");
        id
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<SessionEntry>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Remove a session, cancelling its running turn.
    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        match removed {
            Some(entry) => {
                entry.cancel().await;
                tracing::info!(session = %id, "Deleted chat session");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions idle for at least `max_idle`. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, entry) in sessions.iter() {
            if entry.is_idle(max_idle).await {
                expired.push(*id);
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), "Expired idle chat sessions");
        }
        expired.len()
    }

    /// Sweep idle sessions in the background. A zero `max_idle` disables expiry.
    pub fn spawn_reaper(&self, max_idle: Duration) -> Option<JoinHandle<()>> {
        if max_idle.is_zero() {
            return None;
        }
        let store = self.clone();
        let period = max_idle.min(Duration::from_secs(60));
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                store.evict_idle(max_idle).await;
            }
        }))
    }
}
