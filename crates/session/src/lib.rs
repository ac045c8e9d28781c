//! Call-session layer: the state machine and per-connection handler
//!
//! This crate ties the pipeline together for one connection: a
//! [`CallSession`] holds lifecycle state and conversation history, and
//! a [`SessionHandler`] consumes typed inbound events, drives the
//! segmenter and request coordinator, and emits outbound events for
//! the transport to deliver.

pub mod handler;
pub mod metrics;
pub mod observability;
pub mod session;

pub use handler::SessionHandler;
pub use metrics::init_metrics;
pub use observability::init_tracing;
pub use session::{CallSession, SessionState};

use thiserror::Error;

/// Session-layer errors
#[derive(Error, Debug)]
pub enum SessionError {
    /// The transport stopped acking heartbeats and the session was
    /// force-ended
    #[error("connection lost: {0}")]
    ConnectionLost(String),
}
