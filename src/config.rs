//! Configuration types for the navigation and perception engine.

use crate::error::{AssistError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Spoken announcement settings.
    pub speech: SpeechConfig,
    /// Haptic feedback settings.
    pub haptics: HapticsConfig,
    /// Location subscription settings.
    pub location: LocationConfig,
    /// Turn-by-turn navigation settings.
    pub navigation: NavigationConfig,
    /// Object detection settings.
    pub detection: DetectionConfig,
    /// Detection model settings.
    pub model: ModelConfig,
}

impl AssistConfig {
    /// Load configuration from a TOML file.
    ///
    /// Missing keys fall back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| AssistError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Spoken announcement configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Whether spoken announcements are enabled at all.
    pub enabled: bool,
    /// Default speaking rate multiplier.
    pub rate: f32,
    /// Default voice pitch multiplier.
    pub pitch: f32,
    /// Default utterance language tag.
    pub language: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rate: 1.0,
            pitch: 1.0,
            language: "en-US".to_owned(),
        }
    }
}

/// Haptic feedback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HapticsConfig {
    /// Whether haptic cues are enabled.
    pub enabled: bool,
    /// Gap between the two pulses of the turn cue, in milliseconds.
    pub turn_pulse_gap_ms: u64,
}

impl Default for HapticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            turn_pulse_gap_ms: 300,
        }
    }
}

/// Location subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    /// Minimum movement in meters between delivered updates.
    pub min_distance_m: f64,
    /// Minimum interval in milliseconds between delivered updates.
    pub min_interval_ms: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            min_distance_m: 1.0,
            min_interval_ms: 1000,
        }
    }
}

/// Navigation state-machine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Route re-evaluation period in milliseconds.
    pub step_interval_ms: u64,
    /// Distance to the destination, in meters, below which the session
    /// transitions to Arrived.
    pub arrival_threshold_m: f64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            step_interval_ms: 5000,
            arrival_threshold_m: 10.0,
        }
    }
}

/// Object detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Frame sampling period in milliseconds.
    pub interval_ms: u64,
    /// Minimum spacing between frames in milliseconds, enforced even when
    /// `interval_ms` is configured lower. Early ticks are skipped, not queued.
    pub min_frame_gap_ms: u64,
    /// Predictions below this confidence are discarded.
    pub confidence_threshold: f32,
    /// At most this many detections are kept per frame.
    pub max_detections: usize,
    /// Whether detection batches are spoken aloud.
    pub announcements_enabled: bool,
    /// Estimated distance, in meters, below which a detection is treated as
    /// an obstacle (stronger haptic cue).
    pub obstacle_distance_m: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 3000,
            min_frame_gap_ms: 1000,
            confidence_threshold: 0.5,
            max_detections: 5,
            announcements_enabled: true,
            obstacle_distance_m: 2.0,
        }
    }
}

/// Detection model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the ONNX topology file. The external weights blob
    /// (`<file>.data`) is resolved next to it by the runtime.
    pub model_path: PathBuf,
    /// Side length of the model's fixed square input, in pixels.
    pub input_size: u32,
    /// Name of the model's image input tensor.
    pub input_name: String,
    /// Intra-op thread count for the inference session.
    pub intra_threads: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/detector.onnx"),
            input_size: 300,
            input_name: "image_tensor".to_owned(),
            intra_threads: 2,
        }
    }
}
