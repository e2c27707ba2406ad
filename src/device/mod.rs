//! Device collaborator traits.
//!
//! The engine core never talks to platform APIs directly. Text-to-speech,
//! vibration, geolocation, and camera access are all reached through these
//! traits; the host supplies bindings, and [`sim`] supplies simulated
//! implementations for tests and the demo binary.

pub mod sim;

use crate::error::Result;
use crate::location::Position;
use async_trait::async_trait;
use std::time::Instant;
use tokio::sync::mpsc;

/// Fully resolved voice parameters for one utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceParams {
    /// Speaking rate multiplier.
    pub rate: f32,
    /// Voice pitch multiplier.
    pub pitch: f32,
    /// Language tag, e.g. `"en-US"`.
    pub language: String,
}

/// Vibration impulse categories the engine can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Impulse {
    Light,
    Medium,
    Heavy,
    Success,
    Warning,
    Error,
}

/// One camera frame as an encoded image buffer (JPEG or PNG).
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// When the frame was captured.
    pub captured_at: Instant,
}

/// Text-to-speech device.
///
/// `speak` resolves when the utterance has finished vocalizing (or failed);
/// that completion is the queue's only advancement signal. Implementations
/// must make `stop` halt an in-progress utterance promptly.
#[async_trait]
pub trait TtsDevice: Send + Sync {
    /// Vocalize `text` to completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine is absent or the utterance fails.
    async fn speak(&self, text: &str, params: &VoiceParams) -> Result<()>;

    /// Halt the current utterance, if any.
    fn stop(&self);

    /// Whether the device is vocalizing right now.
    fn is_speaking(&self) -> bool;
}

/// Vibration device. Impulses are fire-and-forget.
pub trait VibrationDevice: Send + Sync {
    /// Fire a single impulse.
    ///
    /// # Errors
    ///
    /// Returns an error if the motor rejects the request; callers are
    /// expected to swallow it.
    fn impulse(&self, impulse: Impulse) -> Result<()>;
}

/// Geolocation device: permission, one-shot fixes, and a continuous stream.
#[async_trait]
pub trait GeolocationDevice: Send + Sync {
    /// Ask the platform for location permission.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission system itself is unreachable.
    async fn request_permission(&self) -> Result<bool>;

    /// Obtain a single position fix.
    ///
    /// # Errors
    ///
    /// Returns [`Unavailable`](crate::error::AssistError::Unavailable) when
    /// no fix is obtainable.
    async fn current_position(&self) -> Result<Position>;

    /// Start continuous position updates.
    ///
    /// The returned channel yields fixes (or transient errors) until
    /// [`stop_updates`](GeolocationDevice::stop_updates) is called or the
    /// receiver is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be started.
    async fn start_updates(&self) -> Result<mpsc::Receiver<Result<Position>>>;

    /// Stop the continuous update stream, if one is active.
    fn stop_updates(&self);
}

/// Camera device: permission and single-frame capture.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Ask the platform for camera permission.
    ///
    /// # Errors
    ///
    /// Returns an error if the permission system itself is unreachable.
    async fn request_permission(&self) -> Result<bool>;

    /// Capture one frame as an encoded image buffer.
    ///
    /// # Errors
    ///
    /// Returns a [`Device`](crate::error::AssistError::Device) error on a
    /// transient capture failure.
    async fn capture_frame(&self) -> Result<CapturedFrame>;
}
