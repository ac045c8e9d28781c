//! Energy/spectral voice-activity detection
//!
//! This is a deliberately simple heuristic detector, not a trained
//! model. It combines an adaptive RMS-energy threshold with a coarse
//! spectral estimate built from sample-difference magnitudes at three
//! stride lengths. Thresholds and weights were hand-tuned against
//! near-field 16 kHz capture; see `callstream_config::constants::vad`.
//!
//! The detector is stateful only in its rolling energy history, which
//! is discarded with the session. The history's order statistics are
//! kept in an incrementally-maintained sorted mirror so classifying a
//! chunk never re-sorts the window.

use parking_lot::Mutex;
use std::collections::VecDeque;

use callstream_config::constants::{audio, vad};
use callstream_config::VadSettings;
use callstream_core::audio::{pcm16_to_f32, rms_energy};

/// Per-chunk classification result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadDecision {
    /// Final speech/non-speech call
    pub is_speech: bool,
    /// Normalized RMS energy of the chunk, in [0, 1]
    pub energy: f32,
    /// Voice confidence from the spectral heuristic, in [0, 1]
    pub confidence: f32,
    /// Energy threshold in effect when the decision was made
    pub threshold: f32,
}

/// Mutable detector state behind a single lock
struct VadMutableState {
    /// Rolling per-chunk energies in arrival order
    history: VecDeque<f32>,
    /// Sorted mirror of `history` for order statistics
    sorted: Vec<f32>,
}

/// Heuristic voice-activity detector with an adaptive energy threshold
pub struct VoiceActivityDetector {
    config: VadSettings,
    mutable: Mutex<VadMutableState>,
}

impl VoiceActivityDetector {
    pub fn new(config: VadSettings) -> Self {
        let capacity = config.history_capacity;
        Self {
            config,
            mutable: Mutex::new(VadMutableState {
                history: VecDeque::with_capacity(capacity),
                sorted: Vec::with_capacity(capacity),
            }),
        }
    }

    /// Classify a raw PCM16 chunk
    pub fn classify(&self, chunk: &[u8]) -> VadDecision {
        let samples = pcm16_to_f32(chunk);
        self.classify_samples(&samples)
    }

    /// Classify a chunk of normalized f32 samples
    pub fn classify_samples(&self, samples: &[f32]) -> VadDecision {
        let energy = rms_energy(samples);
        let mut state = self.mutable.lock();

        // Too short to analyze. Not appended to the history either, so
        // a burst of tiny fragments cannot drag the noise floor down.
        if samples.len() < audio::MIN_ANALYSIS_SAMPLES {
            let threshold = self.threshold_of(&state.sorted);
            return VadDecision {
                is_speech: false,
                energy,
                confidence: 0.0,
                threshold,
            };
        }

        self.push_energy(&mut state, energy);
        let threshold = self.threshold_of(&state.sorted);
        drop(state);

        let confidence = spectral_confidence(samples);
        let is_speech = decide(energy, confidence, threshold, &self.config);

        tracing::trace!(
            energy = energy,
            confidence = confidence,
            threshold = threshold,
            is_speech = is_speech,
            "vad decision"
        );

        VadDecision {
            is_speech,
            energy,
            confidence,
            threshold,
        }
    }

    /// Energy threshold currently in effect
    pub fn current_threshold(&self) -> f32 {
        self.threshold_of(&self.mutable.lock().sorted)
    }

    /// Number of energies currently in the rolling history
    pub fn history_len(&self) -> usize {
        self.mutable.lock().history.len()
    }

    /// Discard the rolling history
    pub fn reset(&self) {
        let mut state = self.mutable.lock();
        state.history.clear();
        state.sorted.clear();
    }

    fn push_energy(&self, state: &mut VadMutableState, energy: f32) {
        if state.history.len() == self.config.history_capacity {
            if let Some(oldest) = state.history.pop_front() {
                // Mirror entries are exact copies, so an equality scan
                // from the insertion point always finds one.
                if let Ok(idx) = state
                    .sorted
                    .binary_search_by(|v| v.partial_cmp(&oldest).expect("energy is never NaN"))
                {
                    state.sorted.remove(idx);
                }
            }
        }
        state.history.push_back(energy);
        let idx = state.sorted.partition_point(|&v| v < energy);
        state.sorted.insert(idx, energy);
    }

    fn threshold_of(&self, sorted: &[f32]) -> f32 {
        // The emptiness check stands on its own: configuration may set
        // min_history_for_threshold lower than validation allows.
        if sorted.is_empty() || sorted.len() < self.config.min_history_for_threshold {
            return self.config.default_threshold;
        }
        let noise_floor = percentile(sorted, 0.25);
        let median = percentile(sorted, 0.5);
        let threshold = noise_floor + vad::THRESHOLD_MEDIAN_FRACTION * (median - noise_floor);
        threshold.clamp(self.config.threshold_floor, self.config.threshold_ceil)
    }
}

impl Default for VoiceActivityDetector {
    fn default() -> Self {
        Self::new(VadSettings::default())
    }
}

/// Linear-interpolated percentile of an ascending-sorted slice
fn percentile(sorted: &[f32], q: f32) -> f32 {
    debug_assert!(!sorted.is_empty());
    let rank = q * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f32;
    sorted[lo] * (1.0 - frac) + sorted[hi] * frac
}

/// Coarse voice confidence from difference magnitudes at three strides.
///
/// Short strides respond to high-frequency content, long strides to
/// low. Human speech concentrates energy in the mid band, so the
/// confidence combines the mid-band ratio with the overall amplitude
/// variation (standard deviation of adjacent differences).
fn spectral_confidence(samples: &[f32]) -> f32 {
    let band_high = mean_abs_diff(samples, vad::STRIDE_HIGH);
    let band_mid = mean_abs_diff(samples, vad::STRIDE_MID);
    let band_low = mean_abs_diff(samples, vad::STRIDE_LOW);

    let total = band_high + band_mid + band_low;
    if total < f32::EPSILON {
        return 0.0;
    }

    let mid_ratio = band_mid / total;
    let variation = diff_std_dev(samples);

    let mid_component = (mid_ratio * vad::MID_BAND_RATIO_SCALE).min(1.0);
    let variation_component = (variation * vad::VARIATION_SCALE).min(1.0);

    (vad::CONFIDENCE_MID_BAND_WEIGHT * mid_component
        + vad::CONFIDENCE_VARIATION_WEIGHT * variation_component)
        .clamp(0.0, 1.0)
}

fn mean_abs_diff(samples: &[f32], stride: usize) -> f32 {
    if samples.len() <= stride {
        return 0.0;
    }
    let count = samples.len() - stride;
    let sum: f32 = (0..count)
        .map(|i| (samples[i + stride] - samples[i]).abs())
        .sum();
    sum / count as f32
}

fn diff_std_dev(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let count = samples.len() - 1;
    let diffs: Vec<f32> = (0..count)
        .map(|i| (samples[i + 1] - samples[i]).abs())
        .collect();
    let mean = diffs.iter().sum::<f32>() / count as f32;
    let variance = diffs.iter().map(|d| (d - mean) * (d - mean)).sum::<f32>() / count as f32;
    variance.sqrt()
}

/// Two-path decision rule: clear energy with plausible spectral shape,
/// or quieter energy with unambiguous spectral shape. The second path
/// tolerates soft speech while resisting loud non-speech noise.
fn decide(energy: f32, confidence: f32, threshold: f32, config: &VadSettings) -> bool {
    (energy > threshold && confidence > config.confidence_low_bar)
        || (energy > vad::QUIET_SPEECH_ENERGY_FACTOR * threshold
            && confidence > config.confidence_high_bar)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square wave with exact RMS equal to `amplitude`
    fn square_wave(amplitude: f32, period: usize, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                if (i / (period / 2)) % 2 == 0 {
                    amplitude
                } else {
                    -amplitude
                }
            })
            .collect()
    }

    #[test]
    fn test_silent_buffer_is_never_speech() {
        let detector = VoiceActivityDetector::default();
        for _ in 0..20 {
            let decision = detector.classify_samples(&[0.0; 160]);
            assert!(!decision.is_speech);
            assert_eq!(decision.energy, 0.0);
        }
    }

    #[test]
    fn test_short_chunk_is_non_speech_with_zero_confidence() {
        let detector = VoiceActivityDetector::default();
        let loud = vec![0.8f32; 50];
        let decision = detector.classify_samples(&loud);
        assert!(!decision.is_speech);
        assert_eq!(decision.confidence, 0.0);
        // Short fragments do not pollute the noise-floor history
        assert_eq!(detector.history_len(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let detector = VoiceActivityDetector::default();
        for _ in 0..60 {
            detector.classify_samples(&square_wave(0.05, 64, 160));
        }
        assert_eq!(detector.history_len(), 50);
    }

    #[test]
    fn test_default_threshold_until_history_warm() {
        let detector = VoiceActivityDetector::default();
        for _ in 0..5 {
            detector.classify_samples(&square_wave(0.05, 64, 160));
        }
        assert_eq!(detector.current_threshold(), vad::DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_single_loud_outlier_does_not_inflate_threshold() {
        // Energies [0.01] x 9 followed by one 0.5 outlier: the quartile
        // threshold stays pinned at the quiet level, so the next quiet
        // chunk is not misclassified as speech.
        let detector = VoiceActivityDetector::default();
        for _ in 0..9 {
            detector.classify_samples(&square_wave(0.01, 64, 160));
        }
        detector.classify_samples(&square_wave(0.5, 64, 160));

        let decision = detector.classify_samples(&square_wave(0.01, 64, 160));
        assert!(!decision.is_speech);
        assert!((decision.threshold - 0.01).abs() < 1e-4);
    }

    #[test]
    fn test_zero_min_history_still_defaults_on_empty_window() {
        let config = VadSettings {
            min_history_for_threshold: 0,
            ..VadSettings::default()
        };
        let detector = VoiceActivityDetector::new(config);

        assert_eq!(detector.current_threshold(), vad::DEFAULT_THRESHOLD);

        // A sub-analysis-window chunk reads the threshold without ever
        // having pushed an energy
        let decision = detector.classify_samples(&[0.0; 50]);
        assert!(!decision.is_speech);
        assert_eq!(decision.threshold, vad::DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_reset_discards_history() {
        let detector = VoiceActivityDetector::default();
        for _ in 0..15 {
            detector.classify_samples(&square_wave(0.05, 64, 160));
        }
        assert!(detector.history_len() > 0);

        detector.reset();
        assert_eq!(detector.history_len(), 0);
        assert_eq!(detector.current_threshold(), vad::DEFAULT_THRESHOLD);
    }

    #[test]
    fn test_percentile_interpolation() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 1.0), 4.0);
        assert!((percentile(&sorted, 0.5) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn test_decision_paths() {
        let config = VadSettings::default();
        // Loud path: energy above threshold with modest confidence
        assert!(decide(0.1, 0.3, 0.02, &config));
        // Quiet path: 70% of threshold but unambiguous spectral shape
        assert!(decide(0.015, 0.8, 0.02, &config));
        // Loud noise with no speech shape is rejected
        assert!(!decide(0.5, 0.1, 0.02, &config));
        // Quiet with ambiguous shape is rejected
        assert!(!decide(0.015, 0.3, 0.02, &config));
    }

    #[test]
    fn test_spectral_confidence_flat_signal_is_zero() {
        assert_eq!(spectral_confidence(&[0.25; 160]), 0.0);
    }
}
