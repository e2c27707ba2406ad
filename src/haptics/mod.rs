//! Semantic haptic cues.
//!
//! Maps event categories (turn, obstacle, arrival, …) onto vibration
//! impulses. Never propagates device failures: a missing or broken motor
//! must not take down a navigation session.

use crate::config::HapticsConfig;
use crate::device::{Impulse, VibrationDevice};
use crate::platform::Capabilities;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::warn;

/// Fires vibration impulses for semantic events.
pub struct HapticSignaler {
    device: Arc<dyn VibrationDevice>,
    enabled: AtomicBool,
    /// Queried once at construction; no per-call platform branching.
    supported: bool,
    turn_pulse_gap: Duration,
}

impl HapticSignaler {
    pub fn new(
        device: Arc<dyn VibrationDevice>,
        config: &HapticsConfig,
        capabilities: &dyn Capabilities,
    ) -> Self {
        Self {
            device,
            enabled: AtomicBool::new(config.enabled),
            supported: capabilities.supports_haptics(),
            turn_pulse_gap: Duration::from_millis(config.turn_pulse_gap_ms),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed) && self.supported
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Fire a single impulse. No-op when disabled or unsupported; device
    /// failures are logged and swallowed.
    pub fn trigger(&self, impulse: Impulse) {
        if !self.is_enabled() {
            return;
        }
        if let Err(e) = self.device.impulse(impulse) {
            warn!("haptic impulse failed: {e}");
        }
    }

    /// Turn cue: two medium pulses separated by the configured gap.
    pub fn signal_turn(&self) {
        self.trigger(Impulse::Medium);
        if !self.is_enabled() {
            return;
        }
        let device = Arc::clone(&self.device);
        let gap = self.turn_pulse_gap;
        tokio::spawn(async move {
            tokio::time::sleep(gap).await;
            if let Err(e) = device.impulse(Impulse::Medium) {
                warn!("haptic impulse failed: {e}");
            }
        });
    }

    /// Obstacle cue: one heavy pulse.
    pub fn signal_obstacle(&self) {
        self.trigger(Impulse::Heavy);
    }

    /// Arrival cue: success notification.
    pub fn signal_arrival(&self) {
        self.trigger(Impulse::Success);
    }

    pub fn signal_warning(&self) {
        self.trigger(Impulse::Warning);
    }

    pub fn signal_error(&self) {
        self.trigger(Impulse::Error);
    }
}
