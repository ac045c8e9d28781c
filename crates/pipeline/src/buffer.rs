//! Sequence-ordered chunk buffer
//!
//! Holds the audio chunks of the active utterance. Chunks are kept
//! sorted by sequence number on insertion; duplicates and gaps are
//! tolerated. Capacity overflow evicts the oldest chunks so the most
//! recent audio survives, which matches the forced-flush policy of
//! cutting long utterances at the tail end.

use callstream_core::AudioChunk;

/// Bounded, sequence-sorted buffer of audio chunks
#[derive(Debug)]
pub struct ChunkBuffer {
    chunks: Vec<AudioChunk>,
    capacity: usize,
}

impl ChunkBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert a chunk at its sequence-ordered position.
    ///
    /// Equal sequence numbers are placed after existing ones, keeping
    /// insertion stable for duplicates. If the buffer is full, the
    /// lowest-sequence chunks are evicted first.
    pub fn add(&mut self, chunk: AudioChunk) {
        let idx = self
            .chunks
            .partition_point(|c| c.sequence <= chunk.sequence);
        self.chunks.insert(idx, chunk);

        if self.chunks.len() > self.capacity {
            let excess = self.chunks.len() - self.capacity;
            tracing::debug!(evicted = excess, "chunk buffer overflow, dropping oldest");
            self.chunks.drain(0..excess);
        }
    }

    /// Concatenate all payloads in sequence order and clear the buffer.
    ///
    /// No resampling or format validation happens here; a malformed
    /// payload is for downstream transcription to reject.
    pub fn drain(&mut self) -> Vec<u8> {
        let total: usize = self.chunks.iter().map(|c| c.data.len()).sum();
        let mut audio = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..) {
            audio.extend_from_slice(&chunk.data);
        }
        audio
    }

    /// Number of buffered chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Drop all buffered chunks
    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}
