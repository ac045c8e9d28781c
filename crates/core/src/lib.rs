//! Core traits and types for the call-stream processor
//!
//! This crate provides the foundational types used across all other crates:
//! - Audio chunk types and PCM16 helpers
//! - Conversation history types
//! - Typed inbound/outbound session events
//! - Collaborator traits for the remote AI services (STT, LLM, TTS)
//! - Cooperative cancellation token
//! - Error types

pub mod audio;
pub mod cancel;
pub mod conversation;
pub mod error;
pub mod events;
pub mod traits;

pub use audio::AudioChunk;
pub use cancel::CancelToken;
pub use conversation::{ConversationHistory, Turn, TurnRole};
pub use error::{Error, Result};
pub use events::{InboundEvent, OutboundEvent};
pub use traits::{LanguageModel, SpeechSynthesizer, SpeechToText};
