//! Detection model loading and inference.
//!
//! [`ModelProvider`] loads the detector once, reports `{progress, status}`
//! while doing so, and warms the session with a dummy forward pass so the
//! first real frame does not pay lazy-initialization costs.

pub mod labels;

use crate::config::ModelConfig;
use crate::error::{AssistError, Result};
use ort::session::Session;
use ort::value::Tensor;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

/// One raw model prediction, before confidence filtering.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Index into [`labels::COCO_LABELS`].
    pub class_index: usize,
    /// Prediction confidence in `[0, 1]`.
    pub score: f32,
    /// Normalized `[ymin, xmin, ymax, xmax]`.
    pub bbox: [f32; 4],
}

/// A warmed detector ready for fixed-shape forward passes.
pub trait ObjectDetector: Send + Sync {
    /// Side length of the square RGB input, in pixels.
    fn input_size(&self) -> u32;

    /// Run one forward pass over a normalized NHWC `[1, S, S, 3]` frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the input shape is wrong or inference fails.
    fn detect(&self, frame: &[f32]) -> Result<Vec<RawDetection>>;
}

/// ONNX-backed detector.
///
/// The model ships as a file pair: the topology at `model_path` plus an
/// external weights blob (`<model>.data`) the runtime resolves next to it.
/// Expected outputs, in order: boxes `(1, N, 4)`, scores `(1, N)`,
/// classes `(1, N)`.
pub struct OnnxDetector {
    session: Mutex<Session>,
    input_size: u32,
    input_name: String,
}

impl OnnxDetector {
    /// Build an inference session from the bundled model pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be created.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        info!("loading detector model: {}", config.model_path.display());
        let session = Session::builder()
            .and_then(|b| b.with_intra_threads(config.intra_threads))
            .and_then(|b| b.commit_from_file(&config.model_path))
            .map_err(|e| AssistError::Model(format!("failed to load detector model: {e}")))?;
        Ok(Self {
            session: Mutex::new(session),
            input_size: config.input_size,
            input_name: config.input_name.clone(),
        })
    }
}

impl ObjectDetector for OnnxDetector {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn detect(&self, frame: &[f32]) -> Result<Vec<RawDetection>> {
        use ort::session::{SessionInputValue, SessionInputs};

        let size = self.input_size as usize;
        let expected = size * size * 3;
        if frame.len() != expected {
            return Err(AssistError::Model(format!(
                "frame tensor has {} values, expected {expected}",
                frame.len()
            )));
        }

        let input = Tensor::from_array(([1_usize, size, size, 3_usize], frame.to_vec()))
            .map_err(|e| AssistError::Model(format!("failed to create input tensor: {e}")))?;

        let mut feed: HashMap<String, SessionInputValue> = HashMap::new();
        feed.insert(self.input_name.clone(), input.into());

        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let outputs = session
            .run(SessionInputs::from(feed))
            .map_err(|e| AssistError::Model(format!("inference failed: {e}")))?;

        let (_shape, boxes) = outputs[0_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| AssistError::Model(format!("failed to extract boxes: {e}")))?;
        let (_shape, scores) = outputs[1_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| AssistError::Model(format!("failed to extract scores: {e}")))?;
        let (_shape, classes) = outputs[2_usize]
            .try_extract_tensor::<f32>()
            .map_err(|e| AssistError::Model(format!("failed to extract classes: {e}")))?;

        let count = scores.len().min(classes.len()).min(boxes.len() / 4);
        let mut detections = Vec::with_capacity(count);
        for i in 0..count {
            detections.push(RawDetection {
                class_index: classes[i] as usize,
                score: scores[i],
                bbox: [
                    boxes[i * 4],
                    boxes[i * 4 + 1],
                    boxes[i * 4 + 2],
                    boxes[i * 4 + 3],
                ],
            });
        }
        Ok(detections)
    }
}

/// Scripted detector serving prepared batches.
///
/// Keeps the placeholder detection path of the original system available:
/// the demo falls back to it when no model file is bundled, and tests drive
/// the pipeline with it deterministically.
pub struct ScriptedDetector {
    input_size: u32,
    batches: Mutex<VecDeque<Vec<RawDetection>>>,
    looping: bool,
}

impl ScriptedDetector {
    /// Detector that returns queued batches once, then empty batches.
    pub fn new(input_size: u32) -> Self {
        Self {
            input_size,
            batches: Mutex::new(VecDeque::new()),
            looping: false,
        }
    }

    /// Detector that cycles through `batches` forever.
    pub fn looping(input_size: u32, batches: Vec<Vec<RawDetection>>) -> Self {
        Self {
            input_size,
            batches: Mutex::new(batches.into()),
            looping: true,
        }
    }

    /// Queue one batch for a future frame.
    pub fn push_batch(&self, batch: Vec<RawDetection>) {
        self.batches
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(batch);
    }
}

impl ObjectDetector for ScriptedDetector {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn detect(&self, frame: &[f32]) -> Result<Vec<RawDetection>> {
        let expected = (self.input_size as usize).pow(2) * 3;
        if frame.len() != expected {
            return Err(AssistError::Model(format!(
                "frame tensor has {} values, expected {expected}",
                frame.len()
            )));
        }
        let mut batches = self.batches.lock().unwrap_or_else(|e| e.into_inner());
        match batches.pop_front() {
            Some(batch) => {
                if self.looping {
                    batches.push_back(batch.clone());
                }
                Ok(batch)
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Model loading lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// Load progress snapshot reported over a watch channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelLoadState {
    pub phase: LoadPhase,
    /// 0–100; non-decreasing until terminal, reset to 0 on failure.
    pub progress: u8,
    pub status: String,
}

impl ModelLoadState {
    fn idle() -> Self {
        Self {
            phase: LoadPhase::Idle,
            progress: 0,
            status: "model not loaded".to_owned(),
        }
    }
}

enum Source {
    Onnx(ModelConfig),
    Prebuilt(Arc<dyn ObjectDetector>),
}

/// Loads the detector once and shares it.
///
/// `load` is idempotent: concurrent callers serialize on the internal lock
/// and every call after the first returns the cached detector without
/// re-initializing anything.
pub struct ModelProvider {
    source: Source,
    state_tx: watch::Sender<ModelLoadState>,
    loaded: tokio::sync::Mutex<Option<Arc<dyn ObjectDetector>>>,
}

impl ModelProvider {
    /// Provider that loads the bundled ONNX model pair.
    pub fn onnx(config: ModelConfig) -> Self {
        Self::with_source(Source::Onnx(config))
    }

    /// Provider over an already-constructed detector (scripted or custom).
    /// Still goes through the progress/warm-up lifecycle.
    pub fn prebuilt(detector: Arc<dyn ObjectDetector>) -> Self {
        Self::with_source(Source::Prebuilt(detector))
    }

    fn with_source(source: Source) -> Self {
        let (state_tx, _) = watch::channel(ModelLoadState::idle());
        Self {
            source,
            state_tx,
            loaded: tokio::sync::Mutex::new(None),
        }
    }

    /// Subscribe to load progress.
    pub fn state(&self) -> watch::Receiver<ModelLoadState> {
        self.state_tx.subscribe()
    }

    /// Current load progress snapshot.
    pub fn current_state(&self) -> ModelLoadState {
        self.state_tx.borrow().clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current_state().phase == LoadPhase::Ready
    }

    /// Progress only moves forward while loading.
    fn advance(&self, progress: u8, status: &str) {
        self.state_tx.send_modify(|state| {
            state.phase = LoadPhase::Loading;
            state.progress = state.progress.max(progress);
            state.status = status.to_owned();
        });
    }

    fn fail(&self, message: &str) {
        warn!("model load failed: {message}");
        self.state_tx.send_replace(ModelLoadState {
            phase: LoadPhase::Failed,
            progress: 0,
            status: message.to_owned(),
        });
    }

    /// Load (or return the cached) detector, warming it on first load.
    ///
    /// # Errors
    ///
    /// Returns an error if session creation or the warm-up pass fails; the
    /// reported state resets to progress 0 with the failure message.
    pub async fn load(&self) -> Result<Arc<dyn ObjectDetector>> {
        let mut guard = self.loaded.lock().await;
        if let Some(detector) = guard.as_ref() {
            return Ok(Arc::clone(detector));
        }

        self.advance(5, "preparing detector");
        let detector: Arc<dyn ObjectDetector> = match &self.source {
            Source::Onnx(config) => {
                self.advance(10, "reading model files");
                let config = config.clone();
                let built = tokio::task::spawn_blocking(move || OnnxDetector::load(&config))
                    .await
                    .map_err(|e| AssistError::Model(format!("model load task failed: {e}")))?;
                match built {
                    Ok(detector) => Arc::new(detector),
                    Err(e) => {
                        self.fail(&e.to_string());
                        return Err(e);
                    }
                }
            }
            Source::Prebuilt(detector) => Arc::clone(detector),
        };
        self.advance(70, "model graph loaded");

        self.advance(85, "warming up");
        let warm_start = Instant::now();
        let warm_input = vec![0.0_f32; (detector.input_size() as usize).pow(2) * 3];
        let warm_detector = Arc::clone(&detector);
        let warmed = tokio::task::spawn_blocking(move || warm_detector.detect(&warm_input))
            .await
            .map_err(|e| AssistError::Model(format!("warm-up task failed: {e}")))?;
        if let Err(e) = warmed {
            let message = format!("warm-up inference failed: {e}");
            self.fail(&message);
            return Err(AssistError::Model(message));
        }
        info!(
            "detector warm-up complete in {:.0}ms",
            warm_start.elapsed().as_secs_f64() * 1000.0
        );

        self.state_tx.send_replace(ModelLoadState {
            phase: LoadPhase::Ready,
            progress: 100,
            status: "model ready".to_owned(),
        });
        *guard = Some(Arc::clone(&detector));
        Ok(detector)
    }

    /// Wait until the model reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the failure status if loading ended in `Failed`.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.state();
        loop {
            {
                let state = rx.borrow();
                match state.phase {
                    LoadPhase::Ready => return Ok(()),
                    LoadPhase::Failed => {
                        return Err(AssistError::Unavailable(state.status.clone()));
                    }
                    LoadPhase::Idle | LoadPhase::Loading => {}
                }
            }
            rx.changed()
                .await
                .map_err(|_| AssistError::Channel("model state channel closed".into()))?;
        }
    }
}
