//! Call-session state machine
//!
//! One session per connection, owned by that connection's handler and
//! passed explicitly wherever it is needed. There is no shared session
//! registry. The session is dropped with the connection.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use callstream_core::ConversationHistory;

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, call not yet started
    Idle,
    /// Call in progress; audio is accepted
    Active,
    /// Call over; no further audio is processed
    Ending,
}

/// Per-connection call session.
///
/// Transitions Idle -> Active -> Ending, with the transition into
/// Ending happening at most once regardless of how the call ends
/// (client hangup, interrupt storm, or heartbeat timeout).
pub struct CallSession {
    pub id: Uuid,
    state: RwLock<SessionState>,
    started_at: Instant,
    last_activity: RwLock<Instant>,
    history: Arc<Mutex<ConversationHistory>>,
}

impl CallSession {
    pub fn new(max_history_turns: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: RwLock::new(SessionState::Idle),
            started_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
            history: Arc::new(Mutex::new(ConversationHistory::new(max_history_turns))),
        }
    }

    /// Transition Idle -> Active. Returns whether the transition
    /// happened.
    pub fn start(&self) -> bool {
        let mut state = self.state.write();
        if *state == SessionState::Idle {
            *state = SessionState::Active;
            tracing::info!(session_id = %self.id, "session active");
            true
        } else {
            false
        }
    }

    /// Transition into Ending. Returns true only for the first call, so
    /// end-of-call work runs exactly once.
    pub fn end(&self) -> bool {
        let mut state = self.state.write();
        if *state != SessionState::Ending {
            *state = SessionState::Ending;
            tracing::info!(
                session_id = %self.id,
                uptime_secs = self.started_at.elapsed().as_secs(),
                "session ending"
            );
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn is_active(&self) -> bool {
        *self.state.read() == SessionState::Active
    }

    /// Update last activity
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Whether the session has seen no activity for `timeout`
    pub fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.read().elapsed() > timeout
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Conversation history, shared with the request pipeline
    pub fn history(&self) -> Arc<Mutex<ConversationHistory>> {
        Arc::clone(&self.history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        let session = CallSession::new(64);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_active());

        assert!(session.start());
        assert_eq!(session.state(), SessionState::Active);
        assert!(!session.start(), "start is not re-entrant");

        assert!(session.end());
        assert_eq!(session.state(), SessionState::Ending);
        assert!(!session.end(), "ending happens exactly once");
    }

    #[test]
    fn test_idle_session_can_end_directly() {
        let session = CallSession::new(64);
        assert!(session.end());
        assert!(!session.start(), "an ended session never re-activates");
        assert_eq!(session.state(), SessionState::Ending);
    }

    #[test]
    fn test_touch_resets_expiry() {
        let session = CallSession::new(64);
        assert!(!session.is_expired(Duration::from_secs(60)));
        session.touch();
        assert!(!session.is_expired(Duration::from_secs(60)));
    }

    #[test]
    fn test_history_is_shared() {
        let session = CallSession::new(2);
        let a = session.history();
        a.lock().push(callstream_core::Turn::user("one"));
        assert_eq!(session.history().lock().turn_count(), 1);
    }
}
