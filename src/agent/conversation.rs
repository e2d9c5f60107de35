//! Capped, ordered chat history for one session.

use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    System,
    User,
    Assistant,
    /// Output of a tool call, in invocation order after its assistant turn
    Tool,
}

/// One entry in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Tool,
            content: content.into(),
        }
    }
}

/// System prompt plus at most `max_turns` non-system turns.
///
/// When the cap is exceeded the oldest turns go first. A tool turn is never
/// left at the head of the history: once its assistant turn is evicted, the
/// tool turns that followed it go too. The exchange started by the latest
/// user turn is never evicted, so it may briefly run past the cap.
#[derive(Debug, Clone)]
pub struct Conversation {
    system: ConversationTurn,
    turns: Vec<ConversationTurn>,
    max_turns: usize,
}

impl Conversation {
    pub fn new(system_prompt: impl Into<String>, max_turns: usize) -> Self {
        Self {
            system: ConversationTurn::system(system_prompt),
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Append a non-system turn, evicting old turns past the cap.
    pub fn push(&mut self, turn: ConversationTurn) {
        debug_assert!(turn.role != TurnRole::System, "system turn is fixed");
        self.turns.push(turn);
        self.evict();
    }

    fn evict(&mut self) {
        // Only turns before the current exchange are candidates.
        let floor = self
            .turns
            .iter()
            .rposition(|t| t.role == TurnRole::User)
            .unwrap_or(self.turns.len());
        let mut excess = self.turns.len().saturating_sub(self.max_turns).min(floor);
        if excess == 0 {
            return;
        }
        // Extend the cut over tool turns that would otherwise lead the history.
        while excess < floor && self.turns[excess].role == TurnRole::Tool {
            excess += 1;
        }
        let evicted = self.turns.drain(..excess).count();
        tracing::debug!(evicted, "Trimmed conversation history");
    }

    /// Drop every non-system turn.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn system(&self) -> &ConversationTurn {
        &self.system
    }

    /// Non-system turns, oldest first.
    pub fn history(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// All turns, system prompt first.
    pub fn iter(&self) -> impl Iterator<Item = &ConversationTurn> {
        std::iter::once(&self.system).chain(self.turns.iter())
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }
}
