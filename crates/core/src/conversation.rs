//! Conversation turn and history types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role in a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    /// Caller utterance (transcribed)
    User,
    /// Generated reply
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single turn in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Role of the speaker
    pub role: TurnRole,
    /// Content of the turn
    pub content: String,
    /// When the turn occurred
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    /// Create a new turn
    pub fn new(role: TurnRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Create a user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(TurnRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(TurnRole::Assistant, content)
    }

    /// Get word count
    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }
}

/// Ordered conversation history for a single session.
///
/// Bounded by a maximum turn count; older turns are dropped first so
/// the model always sees the most recent context. Never persisted
/// beyond the session lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationHistory {
    turns: Vec<Turn>,
    max_turns: usize,
}

impl ConversationHistory {
    /// Create an empty history with the given bound
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
        }
    }

    /// Append a turn, evicting the oldest if the bound is exceeded
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(0..excess);
        }
    }

    /// All turns in chronological order
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Number of turns currently held
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    /// Most recent turn, if any
    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop all turns
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_creation() {
        let turn = Turn::user("hello there");
        assert_eq!(turn.role, TurnRole::User);
        assert_eq!(turn.word_count(), 2);
    }

    #[test]
    fn test_history_ordering() {
        let mut history = ConversationHistory::new(10);
        history.push(Turn::user("first"));
        history.push(Turn::assistant("second"));

        assert_eq!(history.turn_count(), 2);
        assert_eq!(history.turns()[0].content, "first");
        assert_eq!(history.last().unwrap().content, "second");
    }

    #[test]
    fn test_history_bound_evicts_oldest() {
        let mut history = ConversationHistory::new(3);
        for i in 0..5 {
            history.push(Turn::user(format!("turn {i}")));
        }

        assert_eq!(history.turn_count(), 3);
        assert_eq!(history.turns()[0].content, "turn 2");
        assert_eq!(history.last().unwrap().content, "turn 4");
    }
}
