//! Timer-driven object detection.
//!
//! Samples camera frames on an interval, runs them through the detector,
//! and announces what it finds over the shared speech and haptic channels.
//! Start is gated on camera permission and a loaded model; both are awaited
//! rather than required up front.

pub mod preprocess;

use crate::config::DetectionConfig;
use crate::device::{CameraDevice, Impulse};
use crate::error::{AssistError, ErrorKind, Result};
use crate::haptics::HapticSignaler;
use crate::model::{labels, ModelProvider, ObjectDetector, RawDetection};
use crate::platform::Capabilities;
use crate::runtime::{EventSender, RuntimeEvent};
use crate::speech::SpeechQueue;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Normalized bounding box, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// From model corner output `[ymin, xmin, ymax, xmax]`.
    fn from_corners(corners: [f32; 4]) -> Self {
        let [ymin, xmin, ymax, xmax] = corners;
        Self {
            x: xmin,
            y: ymin,
            width: xmax - xmin,
            height: ymax - ymin,
        }
    }
}

/// One detection from a frame, after filtering.
#[derive(Debug, Clone)]
pub struct DetectedObject {
    /// Unique within its batch: label plus per-batch sequence number.
    pub id: String,
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub bounding_box: Option<BoundingBox>,
    /// Rough proximity derived from confidence alone; not true depth.
    pub estimated_distance_m: Option<f32>,
}

/// Detection pipeline events.
#[derive(Debug, Clone)]
pub enum DetectionEvent {
    /// Preconditions were met and frame sampling began.
    Started,
    /// The pipeline was stopped.
    Stopped,
    /// Detections from one frame. Supersedes the previous batch; empty
    /// batches clear it.
    Batch { objects: Vec<DetectedObject> },
    /// A non-fatal failure (start precondition or a single frame).
    Error { kind: ErrorKind, message: String },
}

struct DetectSession {
    id: u64,
    cancel: CancellationToken,
}

/// Periodic camera → model → announcement pipeline.
pub struct DetectionPipeline {
    camera: Arc<dyn CameraDevice>,
    model: Arc<ModelProvider>,
    speech: Arc<SpeechQueue>,
    haptics: Arc<HapticSignaler>,
    config: DetectionConfig,
    announcements: AtomicBool,
    camera_supported: bool,
    events: EventSender,
    session: Mutex<Option<DetectSession>>,
    session_seq: AtomicU64,
}

impl DetectionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        camera: Arc<dyn CameraDevice>,
        model: Arc<ModelProvider>,
        speech: Arc<SpeechQueue>,
        haptics: Arc<HapticSignaler>,
        config: DetectionConfig,
        capabilities: &dyn Capabilities,
        events: EventSender,
    ) -> Self {
        let announcements = AtomicBool::new(config.announcements_enabled);
        Self {
            camera,
            model,
            speech,
            haptics,
            config,
            announcements,
            camera_supported: capabilities.supports_camera(),
            events,
            session: Mutex::new(None),
            session_seq: AtomicU64::new(0),
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    pub fn set_announcements_enabled(&self, enabled: bool) {
        self.announcements.store(enabled, Ordering::Relaxed);
    }

    /// Begin detecting.
    ///
    /// If camera permission or the model are not ready yet, the session
    /// waits for them and begins once both are available. Precondition
    /// failures are reported once as [`DetectionEvent::Error`] and leave
    /// the pipeline idle. Calling `start` while already detecting is a
    /// no-op.
    pub fn start(self: &Arc<Self>) {
        if !self.camera_supported {
            self.emit_error(
                ErrorKind::Unavailable,
                "camera not available on this host".to_owned(),
            );
            return;
        }
        {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_some() {
                debug!("detection already running");
                return;
            }
            let id = self.session_seq.fetch_add(1, Ordering::Relaxed) + 1;
            let cancel = CancellationToken::new();
            *guard = Some(DetectSession {
                id,
                cancel: cancel.clone(),
            });
            let this = Arc::clone(self);
            tokio::spawn(async move { this.run(id, cancel).await });
        }
    }

    /// Stop detecting: the timer is cancelled synchronously; an in-flight
    /// frame finishes but its result is discarded. Idempotent.
    pub fn stop(&self) {
        let taken = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = taken {
            session.cancel.cancel();
            info!("detection stopped");
            let _ = self
                .events
                .send(RuntimeEvent::Detection(DetectionEvent::Stopped));
        }
    }

    fn is_current(&self, session_id: u64) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|s| s.id == session_id)
    }

    fn clear_session(&self, session_id: u64) {
        let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        if guard.as_ref().is_some_and(|s| s.id == session_id) {
            *guard = None;
        }
    }

    fn emit_error(&self, kind: ErrorKind, message: String) {
        warn!("detection error: {message}");
        let _ = self
            .events
            .send(RuntimeEvent::Detection(DetectionEvent::Error {
                kind,
                message,
            }));
    }

    async fn run(self: Arc<Self>, session_id: u64, cancel: CancellationToken) {
        // Deferred preconditions: permission grant, then model readiness.
        let granted = tokio::select! {
            () = cancel.cancelled() => return,
            result = self.camera.request_permission() => result,
        };
        match granted {
            Ok(true) => {}
            Ok(false) => {
                self.emit_error(
                    ErrorKind::PermissionDenied,
                    "camera permission denied".to_owned(),
                );
                self.clear_session(session_id);
                return;
            }
            Err(e) => {
                self.emit_error(e.kind(), e.to_string());
                self.clear_session(session_id);
                return;
            }
        }

        let detector = tokio::select! {
            () = cancel.cancelled() => return,
            loaded = self.model.load() => match loaded {
                Ok(detector) => detector,
                Err(e) => {
                    self.emit_error(ErrorKind::Unavailable, e.to_string());
                    self.clear_session(session_id);
                    return;
                }
            },
        };
        if !self.is_current(session_id) {
            return;
        }

        info!(
            "detection started (interval {}ms, floor {}ms)",
            self.config.interval_ms, self.config.min_frame_gap_ms
        );
        let _ = self
            .events
            .send(RuntimeEvent::Detection(DetectionEvent::Started));

        let period = Duration::from_millis(self.config.interval_ms.max(1));
        let floor = Duration::from_millis(self.config.min_frame_gap_ms);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_frame: Option<Instant> = None;

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    // Floor between frames: early ticks are skipped, never queued.
                    if let Some(at) = last_frame {
                        if at.elapsed() < floor {
                            debug!("skipping frame, inter-frame floor not elapsed");
                            continue;
                        }
                    }
                    last_frame = Some(Instant::now());
                    match self.run_frame(&detector).await {
                        Ok(raw) => {
                            if !self.is_current(session_id) {
                                // Stopped while inferring; discard the result.
                                break;
                            }
                            let objects = build_batch(raw, &self.config);
                            let _ = self.events.send(RuntimeEvent::Detection(
                                DetectionEvent::Batch { objects: objects.clone() },
                            ));
                            if !objects.is_empty() {
                                self.announce(&objects);
                            }
                        }
                        Err(e) => {
                            if !self.is_current(session_id) {
                                break;
                            }
                            // Transient: the next tick retries on its own.
                            self.emit_error(e.kind(), e.to_string());
                        }
                    }
                }
            }
        }
    }

    /// Capture, preprocess, and infer a single frame.
    ///
    /// Decode and inference run on the blocking pool; the frame buffer and
    /// tensor are dropped inside the closure, before results are emitted.
    async fn run_frame(&self, detector: &Arc<dyn ObjectDetector>) -> Result<Vec<RawDetection>> {
        let frame = self.camera.capture_frame().await?;
        let input_size = detector.input_size();
        let detector = Arc::clone(detector);
        tokio::task::spawn_blocking(move || {
            let tensor = preprocess::tensor_from_frame(&frame.data, input_size)?;
            detector.detect(&tensor)
        })
        .await
        .map_err(|e| AssistError::Device(format!("frame task failed: {e}")))?
    }

    fn announce(&self, objects: &[DetectedObject]) {
        let obstacle = objects.iter().any(|o| {
            o.estimated_distance_m
                .is_some_and(|d| d < self.config.obstacle_distance_m)
        });
        if obstacle {
            self.haptics.signal_obstacle();
        } else {
            self.haptics.trigger(Impulse::Light);
        }
        if self.announcements.load(Ordering::Relaxed) {
            self.speech.enqueue_default(&compose_announcement(objects));
        }
    }
}

/// Filter raw detections by confidence, keep the strongest, and attach
/// batch-unique ids and distance estimates.
fn build_batch(mut raw: Vec<RawDetection>, config: &DetectionConfig) -> Vec<DetectedObject> {
    raw.retain(|d| d.score >= config.confidence_threshold);
    raw.sort_by(|a, b| b.score.total_cmp(&a.score));
    raw.truncate(config.max_detections);
    raw.into_iter()
        .enumerate()
        .map(|(seq, d)| {
            let label = labels::label_for(d.class_index);
            DetectedObject {
                id: format!("{label}-{seq}"),
                label: label.to_owned(),
                confidence: d.score,
                bounding_box: Some(BoundingBox::from_corners(d.bbox)),
                estimated_distance_m: Some(estimate_distance(d.score)),
            }
        })
        .collect()
}

/// Proximity proxy: higher confidence reads as closer. Not true depth.
fn estimate_distance(confidence: f32) -> f32 {
    ((1.0 - confidence) * 10.0).clamp(0.5, 10.0)
}

/// Compose one sentence covering the whole batch, in natural list form:
/// "a cat and a dog", "a cat, a dog, and a person".
fn compose_announcement(objects: &[DetectedObject]) -> String {
    let phrases: Vec<String> = objects.iter().map(object_phrase).collect();
    let list = match phrases.as_slice() {
        [] => return String::new(),
        [only] => only.clone(),
        [first, second] => format!("{first} and {second}"),
        [rest @ .., last] => format!("{}, and {last}", rest.join(", ")),
    };
    let mut chars = list.chars();
    match chars.next() {
        Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
        None => String::new(),
    }
}

fn object_phrase(object: &DetectedObject) -> String {
    let article = match object.label.chars().next() {
        Some('a' | 'e' | 'i' | 'o' | 'u') => "an",
        _ => "a",
    };
    match object.estimated_distance_m {
        Some(distance) => {
            let meters = distance.round().max(1.0) as u32;
            if meters == 1 {
                format!("{article} {} about 1 meter away", object.label)
            } else {
                format!("{article} {} about {meters} meters away", object.label)
            }
        }
        None => format!("{article} {}", object.label),
    }
}
