//! Simulated devices for tests and the demo binary.
//!
//! Each simulator records what the engine asked of it so tests can assert
//! on ordering and timing without real hardware.

use super::{
    CameraDevice, CapturedFrame, GeolocationDevice, Impulse, TtsDevice, VibrationDevice,
    VoiceParams,
};
use crate::error::{AssistError, Result};
use crate::location::Position;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Simulated text-to-speech device.
///
/// "Vocalizing" is a short sleep; completed utterances land in a transcript
/// together with their speaking interval.
pub struct SimTts {
    latency: Duration,
    transcript: Mutex<Vec<String>>,
    intervals: Mutex<Vec<(Instant, Instant)>>,
    speaking: AtomicBool,
    fail_all: AtomicBool,
}

impl SimTts {
    pub fn new() -> Self {
        Self::with_latency(Duration::from_millis(5))
    }

    /// Simulator that takes `latency` to vocalize each utterance.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            transcript: Mutex::new(Vec::new()),
            intervals: Mutex::new(Vec::new()),
            speaking: AtomicBool::new(false),
            fail_all: AtomicBool::new(false),
        }
    }

    /// Make every subsequent `speak` call fail.
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::Relaxed);
    }

    /// Texts of all completed utterances, in completion order.
    pub fn transcript(&self) -> Vec<String> {
        lock(&self.transcript).clone()
    }

    /// (start, end) of each completed utterance.
    pub fn speak_intervals(&self) -> Vec<(Instant, Instant)> {
        lock(&self.intervals).clone()
    }
}

impl Default for SimTts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtsDevice for SimTts {
    async fn speak(&self, text: &str, _params: &VoiceParams) -> Result<()> {
        if self.fail_all.load(Ordering::Relaxed) {
            return Err(AssistError::Device("simulated TTS failure".into()));
        }
        let started = Instant::now();
        self.speaking.store(true, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        self.speaking.store(false, Ordering::Relaxed);
        lock(&self.transcript).push(text.to_owned());
        lock(&self.intervals).push((started, Instant::now()));
        Ok(())
    }

    fn stop(&self) {
        self.speaking.store(false, Ordering::Relaxed);
    }

    fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::Relaxed)
    }
}

/// Simulated vibration motor recording every impulse.
#[derive(Default)]
pub struct SimVibration {
    impulses: Mutex<Vec<(Impulse, Instant)>>,
    fail_all: AtomicBool,
}

impl SimVibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::Relaxed);
    }

    /// All impulses fired so far, with timestamps.
    pub fn impulses(&self) -> Vec<(Impulse, Instant)> {
        lock(&self.impulses).clone()
    }

    pub fn count(&self) -> usize {
        lock(&self.impulses).len()
    }
}

impl VibrationDevice for SimVibration {
    fn impulse(&self, impulse: Impulse) -> Result<()> {
        if self.fail_all.load(Ordering::Relaxed) {
            return Err(AssistError::Device("simulated motor failure".into()));
        }
        lock(&self.impulses).push((impulse, Instant::now()));
        Ok(())
    }
}

/// Simulated geolocation device with a scriptable position.
pub struct SimGeolocation {
    permission: AtomicBool,
    unavailable: AtomicBool,
    current: Mutex<Option<Position>>,
    update_tx: Mutex<Option<mpsc::Sender<Result<Position>>>>,
}

impl SimGeolocation {
    pub fn new(start: Position) -> Self {
        Self {
            permission: AtomicBool::new(true),
            unavailable: AtomicBool::new(false),
            current: Mutex::new(Some(start)),
            update_tx: Mutex::new(None),
        }
    }

    /// Make permission requests come back denied.
    pub fn deny_permission(&self) {
        self.permission.store(false, Ordering::Relaxed);
    }

    /// Make one-shot fixes fail as unavailable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Move the simulated device, feeding any active update stream.
    pub fn set_position(&self, position: Position) {
        *lock(&self.current) = Some(position);
        if let Some(tx) = lock(&self.update_tx).as_ref() {
            // Stream consumers that fall behind simply miss intermediate fixes.
            let _ = tx.try_send(Ok(position));
        }
    }

    /// Inject a transient stream error.
    pub fn push_stream_error(&self, message: &str) {
        if let Some(tx) = lock(&self.update_tx).as_ref() {
            let _ = tx.try_send(Err(AssistError::Device(message.to_owned())));
        }
    }
}

#[async_trait]
impl GeolocationDevice for SimGeolocation {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.permission.load(Ordering::Relaxed))
    }

    async fn current_position(&self) -> Result<Position> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AssistError::Unavailable("no position fix".into()));
        }
        lock(&self.current)
            .ok_or_else(|| AssistError::Unavailable("no position fix".into()))
    }

    async fn start_updates(&self) -> Result<mpsc::Receiver<Result<Position>>> {
        let (tx, rx) = mpsc::channel(64);
        *lock(&self.update_tx) = Some(tx);
        Ok(rx)
    }

    fn stop_updates(&self) {
        *lock(&self.update_tx) = None;
    }
}

/// Simulated camera returning a fixed encoded frame.
pub struct SimCamera {
    permission: AtomicBool,
    fail_all: AtomicBool,
    frame: Mutex<Option<Vec<u8>>>,
    captures: AtomicUsize,
    capture_times: Mutex<Vec<Instant>>,
}

impl SimCamera {
    /// Camera that serves `frame` on every capture.
    pub fn with_frame(frame: Vec<u8>) -> Self {
        Self {
            permission: AtomicBool::new(true),
            fail_all: AtomicBool::new(false),
            frame: Mutex::new(Some(frame)),
            captures: AtomicUsize::new(0),
            capture_times: Mutex::new(Vec::new()),
        }
    }

    pub fn deny_permission(&self) {
        self.permission.store(false, Ordering::Relaxed);
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::Relaxed);
    }

    /// Number of capture calls observed.
    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::Relaxed)
    }

    /// Timestamps of all capture calls.
    pub fn capture_times(&self) -> Vec<Instant> {
        lock(&self.capture_times).clone()
    }
}

#[async_trait]
impl CameraDevice for SimCamera {
    async fn request_permission(&self) -> Result<bool> {
        Ok(self.permission.load(Ordering::Relaxed))
    }

    async fn capture_frame(&self) -> Result<CapturedFrame> {
        self.captures.fetch_add(1, Ordering::Relaxed);
        lock(&self.capture_times).push(Instant::now());
        if self.fail_all.load(Ordering::Relaxed) {
            return Err(AssistError::Device("simulated capture failure".into()));
        }
        let data = lock(&self.frame)
            .clone()
            .ok_or_else(|| AssistError::Device("no frame available".into()))?;
        Ok(CapturedFrame {
            data,
            captured_at: Instant::now(),
        })
    }
}

/// Encode a solid-color PNG for use as a simulated camera frame.
pub fn test_frame_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let pixel = image::Rgb(rgb);
    let buffer = image::RgbImage::from_pixel(width, height, pixel);
    let mut encoded = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(buffer)
        .write_to(&mut encoded, image::ImageFormat::Png)
        .expect("encode in-memory PNG");
    encoded.into_inner()
}
