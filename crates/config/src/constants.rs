//! Centralized constants for the call-stream processor
//!
//! Single source of truth for tuning values used across the crates.
//! Hand-tuned values are marked as such; they were calibrated against
//! near-field 16 kHz microphone capture and may not generalize to other
//! capture chains.

/// Audio format defaults
pub mod audio {
    /// Expected sample rate (Hz)
    pub const SAMPLE_RATE: u32 = 16000;

    /// PCM16 normalization divisor (for converting PCM16 to f32)
    pub const PCM16_NORMALIZE: f32 = 32768.0;

    /// PCM16 scaling multiplier (for converting f32 to PCM16)
    pub const PCM16_SCALE: f32 = 32767.0;

    /// Chunks with fewer samples than this are too short to analyze and
    /// are classified as non-speech with zero confidence
    pub const MIN_ANALYSIS_SAMPLES: usize = 100;
}

/// Voice-activity detection tuning
pub mod vad {
    /// Rolling energy history capacity (per-chunk RMS values)
    pub const ENERGY_HISTORY_CAP: usize = 50;

    /// Minimum history length before the dynamic threshold is trusted
    pub const MIN_HISTORY_FOR_THRESHOLD: usize = 10;

    /// Fixed threshold used until enough history accumulates
    pub const DEFAULT_THRESHOLD: f32 = 0.02;

    /// Dynamic threshold clamp band (absolute normalized energy)
    pub const THRESHOLD_FLOOR: f32 = 0.005;
    pub const THRESHOLD_CEIL: f32 = 0.35;

    /// Fraction of the median-above-noise-floor gap added to the noise
    /// floor when computing the dynamic threshold
    pub const THRESHOLD_MEDIAN_FRACTION: f32 = 0.5;

    /// Energy factor for the quiet-speech decision path: audio at 70%
    /// of the threshold still counts as speech if the spectral shape is
    /// unambiguous
    pub const QUIET_SPEECH_ENERGY_FACTOR: f32 = 0.7;

    /// Confidence bars for the two decision paths (hand-tuned)
    pub const CONFIDENCE_LOW_BAR: f32 = 0.25;
    pub const CONFIDENCE_HIGH_BAR: f32 = 0.6;

    /// Sample strides for the three difference bands. Short strides
    /// respond to high-frequency content, long strides to low.
    pub const STRIDE_HIGH: usize = 1;
    pub const STRIDE_MID: usize = 8;
    pub const STRIDE_LOW: usize = 32;

    /// Weights combining mid-band ratio and amplitude variation into
    /// the voice confidence (hand-tuned)
    pub const CONFIDENCE_MID_BAND_WEIGHT: f32 = 0.7;
    pub const CONFIDENCE_VARIATION_WEIGHT: f32 = 0.3;

    /// Scale factors mapping raw band ratio / difference std-dev into
    /// [0, 1] confidence components (hand-tuned)
    pub const MID_BAND_RATIO_SCALE: f32 = 1.8;
    pub const VARIATION_SCALE: f32 = 25.0;
}

/// Chunk buffering and utterance segmentation
pub mod buffer {
    /// Maximum chunks retained for the active utterance; overflow
    /// evicts the oldest so the most recent audio survives
    pub const CHUNK_CAPACITY: usize = 30;

    /// Flush once this many chunks are buffered and speech has ended
    pub const LOW_WATERMARK: usize = 5;

    /// Force a flush at this many chunks regardless of VAD state
    pub const HIGH_WATERMARK: usize = 8;
}

/// Session lifecycle
pub mod session {
    /// Heartbeat send interval (seconds)
    pub const HEARTBEAT_INTERVAL_SECS: u64 = 5;

    /// Session is considered dead after this long without a heartbeat
    /// ack (seconds)
    pub const HEARTBEAT_TIMEOUT_SECS: u64 = 10;

    /// Maximum conversation turns retained per session
    pub const MAX_HISTORY_TURNS: usize = 64;
}

/// Request pipeline
pub mod pipeline {
    /// Canned reply used when transcription yields nothing usable
    pub const FALLBACK_REPLY: &str =
        "Sorry, I didn't catch that. Could you say it again?";

    /// Outbound event channel capacity per session
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermarks_within_capacity() {
        assert!(buffer::LOW_WATERMARK < buffer::HIGH_WATERMARK);
        assert!(buffer::HIGH_WATERMARK <= buffer::CHUNK_CAPACITY);
    }

    #[test]
    fn test_threshold_band_ordered() {
        assert!(vad::THRESHOLD_FLOOR < vad::THRESHOLD_CEIL);
        assert!(vad::DEFAULT_THRESHOLD >= vad::THRESHOLD_FLOOR);
        assert!(vad::DEFAULT_THRESHOLD <= vad::THRESHOLD_CEIL);
    }

    #[test]
    fn test_confidence_weights_sum_to_one() {
        let sum = vad::CONFIDENCE_MID_BAND_WEIGHT + vad::CONFIDENCE_VARIATION_WEIGHT;
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_heartbeat_timeout_exceeds_interval() {
        assert!(session::HEARTBEAT_TIMEOUT_SECS > session::HEARTBEAT_INTERVAL_SECS);
    }
}
