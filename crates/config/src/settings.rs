//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::constants::{buffer, session, vad};
use crate::ConfigError;

/// Runtime environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    /// Development mode - relaxed validation, warnings only
    #[default]
    Development,
    /// Staging mode - stricter validation
    Staging,
    /// Production mode - all validations enforced
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Runtime environment (development, staging, production)
    #[serde(default)]
    pub environment: RuntimeEnvironment,

    /// Voice-activity detection configuration
    #[serde(default)]
    pub vad: VadSettings,

    /// Chunk buffering and segmentation configuration
    #[serde(default)]
    pub segmenter: SegmenterSettings,

    /// Session lifecycle configuration
    #[serde(default)]
    pub session: SessionSettings,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilitySettings,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_vad()?;
        self.validate_segmenter()?;
        self.validate_session()?;
        Ok(())
    }

    fn validate_vad(&self) -> Result<(), ConfigError> {
        let vad = &self.vad;

        if vad.history_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.history_capacity".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if vad.min_history_for_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "vad.min_history_for_threshold".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if vad.min_history_for_threshold > vad.history_capacity {
            return Err(ConfigError::InvalidValue {
                field: "vad.min_history_for_threshold".to_string(),
                message: format!(
                    "Cannot exceed history_capacity ({})",
                    vad.history_capacity
                ),
            });
        }

        if vad.threshold_floor >= vad.threshold_ceil {
            return Err(ConfigError::InvalidValue {
                field: "vad.threshold_floor".to_string(),
                message: format!(
                    "Must be below threshold_ceil ({})",
                    vad.threshold_ceil
                ),
            });
        }

        for (field, value) in [
            ("vad.confidence_low_bar", vad.confidence_low_bar),
            ("vad.confidence_high_bar", vad.confidence_high_bar),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    message: format!("Must be between 0.0 and 1.0, got {}", value),
                });
            }
        }

        if vad.confidence_low_bar >= vad.confidence_high_bar {
            return Err(ConfigError::InvalidValue {
                field: "vad.confidence_low_bar".to_string(),
                message: format!(
                    "Must be below confidence_high_bar ({})",
                    vad.confidence_high_bar
                ),
            });
        }

        Ok(())
    }

    fn validate_segmenter(&self) -> Result<(), ConfigError> {
        let seg = &self.segmenter;

        if seg.low_watermark == 0 {
            return Err(ConfigError::InvalidValue {
                field: "segmenter.low_watermark".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        if seg.low_watermark >= seg.high_watermark {
            return Err(ConfigError::InvalidValue {
                field: "segmenter.low_watermark".to_string(),
                message: format!(
                    "Must be below high_watermark ({})",
                    seg.high_watermark
                ),
            });
        }

        if seg.high_watermark > seg.chunk_capacity {
            return Err(ConfigError::InvalidValue {
                field: "segmenter.high_watermark".to_string(),
                message: format!(
                    "Cannot exceed chunk_capacity ({})",
                    seg.chunk_capacity
                ),
            });
        }

        Ok(())
    }

    fn validate_session(&self) -> Result<(), ConfigError> {
        let session = &self.session;

        if session.heartbeat_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.heartbeat_interval_secs".to_string(),
                message: "Must be at least 1 second".to_string(),
            });
        }

        if session.heartbeat_timeout_secs <= session.heartbeat_interval_secs {
            return Err(ConfigError::InvalidValue {
                field: "session.heartbeat_timeout_secs".to_string(),
                message: format!(
                    "Must exceed heartbeat_interval_secs ({})",
                    session.heartbeat_interval_secs
                ),
            });
        }

        if session.max_history_turns == 0 {
            return Err(ConfigError::InvalidValue {
                field: "session.max_history_turns".to_string(),
                message: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }
}

/// Voice-activity detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadSettings {
    /// Rolling energy history capacity
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Minimum history length before the dynamic threshold is trusted
    #[serde(default = "default_min_history")]
    pub min_history_for_threshold: usize,

    /// Fixed threshold used until enough history accumulates
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,

    /// Dynamic threshold clamp band
    #[serde(default = "default_threshold_floor")]
    pub threshold_floor: f32,
    #[serde(default = "default_threshold_ceil")]
    pub threshold_ceil: f32,

    /// Confidence bar for the loud-speech decision path
    #[serde(default = "default_confidence_low_bar")]
    pub confidence_low_bar: f32,

    /// Confidence bar for the quiet-speech decision path
    #[serde(default = "default_confidence_high_bar")]
    pub confidence_high_bar: f32,
}

fn default_history_capacity() -> usize {
    vad::ENERGY_HISTORY_CAP
}
fn default_min_history() -> usize {
    vad::MIN_HISTORY_FOR_THRESHOLD
}
fn default_threshold() -> f32 {
    vad::DEFAULT_THRESHOLD
}
fn default_threshold_floor() -> f32 {
    vad::THRESHOLD_FLOOR
}
fn default_threshold_ceil() -> f32 {
    vad::THRESHOLD_CEIL
}
fn default_confidence_low_bar() -> f32 {
    vad::CONFIDENCE_LOW_BAR
}
fn default_confidence_high_bar() -> f32 {
    vad::CONFIDENCE_HIGH_BAR
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            min_history_for_threshold: default_min_history(),
            default_threshold: default_threshold(),
            threshold_floor: default_threshold_floor(),
            threshold_ceil: default_threshold_ceil(),
            confidence_low_bar: default_confidence_low_bar(),
            confidence_high_bar: default_confidence_high_bar(),
        }
    }
}

/// Chunk buffering and segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterSettings {
    /// Maximum chunks retained for the active utterance
    #[serde(default = "default_chunk_capacity")]
    pub chunk_capacity: usize,

    /// Flush threshold when speech has ended
    #[serde(default = "default_low_watermark")]
    pub low_watermark: usize,

    /// Forced-flush threshold regardless of VAD state
    #[serde(default = "default_high_watermark")]
    pub high_watermark: usize,
}

fn default_chunk_capacity() -> usize {
    buffer::CHUNK_CAPACITY
}
fn default_low_watermark() -> usize {
    buffer::LOW_WATERMARK
}
fn default_high_watermark() -> usize {
    buffer::HIGH_WATERMARK
}

impl Default for SegmenterSettings {
    fn default() -> Self {
        Self {
            chunk_capacity: default_chunk_capacity(),
            low_watermark: default_low_watermark(),
            high_watermark: default_high_watermark(),
        }
    }
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Heartbeat send interval (seconds)
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Heartbeat ack timeout (seconds)
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// Maximum conversation turns retained
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,
}

fn default_heartbeat_interval() -> u64 {
    session::HEARTBEAT_INTERVAL_SECS
}
fn default_heartbeat_timeout() -> u64 {
    session::HEARTBEAT_TIMEOUT_SECS
}
fn default_max_history_turns() -> usize {
    session::MAX_HISTORY_TURNS
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            max_history_turns: default_max_history_turns(),
        }
    }
}

/// Observability settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilitySettings {
    /// Log level filter (overridden by RUST_LOG)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilitySettings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
        }
    }
}

/// Load settings from files and environment
///
/// Priority (highest to lowest):
/// 1. Environment variables (CALLSTREAM_ prefix)
/// 2. config/{env}.yaml (if env specified)
/// 3. config/default.yaml
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("CALLSTREAM")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;

    settings.validate()?;

    Ok(settings)
}
