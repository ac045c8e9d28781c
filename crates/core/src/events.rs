//! Typed session events
//!
//! These are the events exchanged between a connection's transport layer
//! and its session handler. The wire framing (WebSocket, gRPC, test
//! harness channels) is the transport's concern; the handler only ever
//! sees these typed values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events flowing from the client into the session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Begin the call
    CallStart,
    /// End the call
    CallEnd,
    /// A streamed microphone audio chunk (raw PCM16)
    AudioChunk {
        data: Vec<u8>,
        sequence_number: u64,
        timestamp: DateTime<Utc>,
    },
    /// A complete client-assembled utterance, bypassing segmentation
    AudioComplete { data: Vec<u8>, request_id: Uuid },
    /// User interrupted the assistant mid-reply
    Interrupt,
    /// Acknowledgment of a server heartbeat
    HeartbeatAck,
}

/// Events flowing from the session back to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Call accepted and session is active
    CallStarted { session_id: Uuid },
    /// Call torn down
    CallEnded,
    /// Live voice-activity status for the most recent chunk
    VadStatus {
        is_speaking: bool,
        energy_level: f32,
        threshold: f32,
    },
    /// An utterance was flushed and its pipeline started
    ProcessingStarted { request_id: Uuid },
    /// Completed turn: transcription, reply text, and synthesized audio.
    /// `audio` is absent when synthesis failed and the turn degraded to
    /// text only.
    StreamResponse {
        request_id: Uuid,
        transcription: String,
        reply: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        audio: Option<Vec<u8>>,
    },
    /// Pipeline failure for a specific request
    StreamError {
        request_id: Uuid,
        message: String,
    },
    /// Acknowledgment that the in-flight reply was cancelled
    AiInterrupted,
    /// Periodic liveness probe; the client must answer with
    /// `heartbeat_ack`
    Heartbeat,
}
