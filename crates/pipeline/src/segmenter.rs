//! Utterance segmentation over VAD results and buffer state
//!
//! The segmenter ingests chunks one at a time, classifies them, and
//! decides when the buffered audio constitutes a complete utterance.
//! Flushing hands the drained audio back to the caller and never blocks
//! on transcription; ingestion for the next utterance resumes
//! immediately. Single-utterance-in-flight is enforced one layer up, in
//! the request coordinator, to keep buffering decoupled from
//! transcription latency.

use callstream_config::SegmenterSettings;
use callstream_core::AudioChunk;

use crate::buffer::ChunkBuffer;
use crate::vad::{VadDecision, VoiceActivityDetector};

/// Speech state derived from the most recent chunk's classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechState {
    #[default]
    Silence,
    Speaking,
}

/// Result of ingesting one chunk
#[derive(Debug)]
pub struct SegmentOutcome {
    /// Classification of the ingested chunk, for live VAD status
    pub decision: VadDecision,
    /// Drained utterance audio when a flush was triggered
    pub utterance: Option<Vec<u8>>,
}

/// Decides when the buffered audio forms a complete utterance
pub struct UtteranceSegmenter {
    vad: VoiceActivityDetector,
    buffer: ChunkBuffer,
    state: SpeechState,
    /// Whether any chunk of the current window was classified as speech
    speech_seen: bool,
    low_watermark: usize,
    high_watermark: usize,
}

impl UtteranceSegmenter {
    pub fn new(vad: VoiceActivityDetector, config: SegmenterSettings) -> Self {
        Self {
            vad,
            buffer: ChunkBuffer::new(config.chunk_capacity),
            state: SpeechState::Silence,
            speech_seen: false,
            low_watermark: config.low_watermark,
            high_watermark: config.high_watermark,
        }
    }

    /// Ingest one chunk: classify, buffer, and flush if the utterance
    /// is complete.
    ///
    /// Flush triggers:
    /// - the buffer has reached the low watermark, speech was observed
    ///   in this window, and the latest chunk is silence (the utterance
    ///   ended naturally), or
    /// - the buffer has reached the high watermark, regardless of VAD
    ///   state (forced flush bounding latency and memory).
    pub fn ingest(&mut self, chunk: AudioChunk) -> SegmentOutcome {
        let decision = self.vad.classify(&chunk.data);

        self.state = if decision.is_speech {
            self.speech_seen = true;
            SpeechState::Speaking
        } else {
            SpeechState::Silence
        };

        self.buffer.add(chunk);

        let count = self.buffer.len();
        let natural_end = count >= self.low_watermark
            && self.speech_seen
            && self.state == SpeechState::Silence;
        let forced = count >= self.high_watermark;

        let utterance = if natural_end || forced {
            tracing::debug!(
                chunks = count,
                forced = forced,
                "flushing utterance"
            );
            self.speech_seen = false;
            self.state = SpeechState::Silence;
            Some(self.buffer.drain())
        } else {
            None
        };

        SegmentOutcome {
            decision,
            utterance,
        }
    }

    /// Current speech state
    pub fn state(&self) -> SpeechState {
        self.state
    }

    /// Chunks currently buffered
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop buffered audio and detector history
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.vad.reset();
        self.state = SpeechState::Silence;
        self.speech_seen = false;
    }
}
