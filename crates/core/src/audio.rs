//! Audio chunk types and PCM16 utilities

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// PCM16 normalization divisor (for converting PCM16 to f32)
///
/// Mirror value in `callstream_config::constants::audio::PCM16_NORMALIZE`.
/// Defined here as well to avoid a circular dependency (core cannot
/// depend on config).
pub const PCM16_NORMALIZE: f32 = 32768.0;

/// PCM16 scaling multiplier (for converting f32 to PCM16)
pub const PCM16_SCALE: f32 = 32767.0;

/// A single audio chunk as delivered by the client.
///
/// Payload is raw little-endian PCM16 mono. Sequence numbers are
/// expected monotonic per session but may arrive out of order, and
/// duplicates are possible after client-side retransmits. Immutable
/// after creation.
#[derive(Clone)]
pub struct AudioChunk {
    /// Raw PCM16 payload (little-endian)
    pub data: Arc<[u8]>,
    /// Sequence number assigned by the client
    pub sequence: u64,
    /// Capture timestamp reported by the client
    pub timestamp: DateTime<Utc>,
}

impl std::fmt::Debug for AudioChunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioChunk")
            .field("bytes", &self.data.len())
            .field("sequence", &self.sequence)
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl AudioChunk {
    /// Create a new chunk from raw PCM16 bytes
    pub fn new(data: impl Into<Arc<[u8]>>, sequence: u64, timestamp: DateTime<Utc>) -> Self {
        Self {
            data: data.into(),
            sequence,
            timestamp,
        }
    }

    /// Number of PCM16 samples in the payload
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Decode the payload into normalized f32 samples in [-1.0, 1.0]
    pub fn samples(&self) -> Vec<f32> {
        pcm16_to_f32(&self.data)
    }
}

/// Decode little-endian PCM16 bytes into f32 samples in [-1.0, 1.0]
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|chunk| {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            sample as f32 / PCM16_NORMALIZE
        })
        .collect()
}

/// Encode f32 samples into little-endian PCM16 bytes
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&sample| {
            let clamped = sample.clamp(-1.0, 1.0);
            let pcm16 = (clamped * PCM16_SCALE) as i16;
            pcm16.to_le_bytes()
        })
        .collect()
}

/// RMS energy of a sample buffer, normalized to [0.0, 1.0].
///
/// Samples are treated as deviations from the channel midpoint, so a
/// constant-midpoint buffer has zero energy.
pub fn rms_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}
