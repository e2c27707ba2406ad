//! Read-only key-value settings overlay.
//!
//! The host application persists user preferences in a simple key-value
//! store. The engine reads them once at startup and overlays them onto the
//! config defaults; it never writes back.

use crate::config::AssistConfig;
use std::collections::HashMap;

/// Read-only view of the host's persisted settings.
pub trait SettingsStore: Send + Sync {
    /// Raw string value for a key, if present.
    fn get(&self, key: &str) -> Option<String>;

    /// Boolean value for a key ("true"/"false").
    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.parse().ok()
    }

    /// Floating-point value for a key.
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Unsigned integer value for a key.
    fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.parse().ok()
    }
}

/// In-memory settings store, used by tests and the demo binary.
#[derive(Debug, Default, Clone)]
pub struct MemorySettings {
    values: HashMap<String, String>,
}

impl MemorySettings {
    /// Build a store from key/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SettingsStore for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Overlay persisted settings onto `config`. Unknown or malformed values
/// leave the corresponding default untouched.
pub fn apply_settings(config: &mut AssistConfig, store: &dyn SettingsStore) {
    if let Some(v) = store.get_bool("speech.enabled") {
        config.speech.enabled = v;
    }
    if let Some(v) = store.get_f64("speech.rate") {
        config.speech.rate = v as f32;
    }
    if let Some(v) = store.get_f64("speech.pitch") {
        config.speech.pitch = v as f32;
    }
    if let Some(v) = store.get("speech.language") {
        config.speech.language = v;
    }
    if let Some(v) = store.get_bool("haptics.enabled") {
        config.haptics.enabled = v;
    }
    if let Some(v) = store.get_bool("announcements.enabled") {
        config.detection.announcements_enabled = v;
    }
    if let Some(v) = store.get_f64("detection.confidence_threshold") {
        config.detection.confidence_threshold = v as f32;
    }
    if let Some(v) = store.get_u64("detection.max_detections") {
        config.detection.max_detections = v as usize;
    }
    if let Some(v) = store.get_u64("detection.interval_ms") {
        config.detection.interval_ms = v;
    }
    if let Some(v) = store.get_f64("navigation.arrival_threshold_m") {
        config.navigation.arrival_threshold_m = v;
    }
    if let Some(v) = store.get_u64("navigation.step_interval_ms") {
        config.navigation.step_interval_ms = v;
    }
}
