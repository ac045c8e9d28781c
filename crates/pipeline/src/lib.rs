//! Audio-stream processing pipeline
//!
//! Leaf-to-root: [`vad::VoiceActivityDetector`] classifies chunks,
//! [`buffer::ChunkBuffer`] reorders and bounds them,
//! [`segmenter::UtteranceSegmenter`] decides when an utterance is
//! complete, and [`coordinator::RequestCoordinator`] runs the
//! transcribe/complete/synthesize pipeline with cancellation checks at
//! every stage boundary.

pub mod buffer;
pub mod coordinator;
pub mod segmenter;
pub mod vad;

pub use buffer::ChunkBuffer;
pub use coordinator::{RequestCoordinator, RequestHandle, RequestOutcome};
pub use segmenter::{SegmentOutcome, SpeechState, UtteranceSegmenter};
pub use vad::{VadDecision, VoiceActivityDetector};

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("audio persistence failed: {0}")]
    Persistence(String),

    #[error("malformed audio payload: {0}")]
    MalformedAudio(String),
}

impl From<callstream_core::Error> for PipelineError {
    fn from(err: callstream_core::Error) -> Self {
        use callstream_core::Error;
        match err {
            Error::Transcription(msg) => PipelineError::Transcription(msg),
            Error::Completion(msg) => PipelineError::Completion(msg),
            Error::Synthesis(msg) => PipelineError::Synthesis(msg),
            Error::MalformedAudio(msg) => PipelineError::MalformedAudio(msg),
            Error::Io(e) => PipelineError::Persistence(e.to_string()),
        }
    }
}
