//! Core error types

use thiserror::Error;

/// Errors surfaced by the collaborator services and core audio handling
#[derive(Error, Debug)]
pub enum Error {
    /// Transcription backend failed
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Completion backend failed
    #[error("completion error: {0}")]
    Completion(String),

    /// Synthesis backend failed
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Audio payload was missing or unparseable
    #[error("malformed audio: {0}")]
    MalformedAudio(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
