//! End-to-end detection scenarios over simulated devices.

use sightline::config::{AssistConfig, DetectionConfig};
use sightline::detect::{DetectionEvent, DetectionPipeline};
use sightline::device::Impulse;
use sightline::device::sim::{SimCamera, SimTts, SimVibration, test_frame_png};
use sightline::error::ErrorKind;
use sightline::haptics::HapticSignaler;
use sightline::model::{ModelProvider, RawDetection, ScriptedDetector};
use sightline::platform::StaticCapabilities;
use sightline::runtime::{EventReceiver, RuntimeEvent, event_bus};
use sightline::speech::SpeechQueue;
use std::sync::Arc;
use std::time::Duration;

const INPUT_SIZE: u32 = 16;

fn raw(class_index: usize, score: f32) -> RawDetection {
    RawDetection {
        class_index,
        score,
        bbox: [0.2, 0.2, 0.7, 0.6],
    }
}

struct Harness {
    pipeline: Arc<DetectionPipeline>,
    camera: Arc<SimCamera>,
    tts: Arc<SimTts>,
    vibration: Arc<SimVibration>,
    rx: EventReceiver,
}

/// Build a pipeline over a pre-loaded scripted detector so queued batches
/// map 1:1 onto frames (the warm-up pass has already run).
async fn harness(config: DetectionConfig, detector: Arc<ScriptedDetector>) -> Harness {
    let defaults = AssistConfig::default();
    let (events, rx) = event_bus();

    let tts = Arc::new(SimTts::with_latency(Duration::from_millis(2)));
    let vibration = Arc::new(SimVibration::new());
    let camera = Arc::new(SimCamera::with_frame(test_frame_png(24, 24, [60, 60, 60])));

    let provider = Arc::new(ModelProvider::prebuilt(detector));
    provider.load().await.expect("pre-load detector");

    let speech = Arc::new(SpeechQueue::new(
        tts.clone(),
        &defaults.speech,
        events.clone(),
    ));
    let haptics = Arc::new(HapticSignaler::new(
        vibration.clone(),
        &defaults.haptics,
        &StaticCapabilities::new(true, true),
    ));
    let pipeline = Arc::new(DetectionPipeline::new(
        camera.clone(),
        provider,
        speech,
        haptics,
        config,
        &StaticCapabilities::new(true, true),
        events,
    ));

    Harness {
        pipeline,
        camera,
        tts,
        vibration,
        rx,
    }
}

async fn drain_detection_events(rx: &mut EventReceiver, window: Duration) -> Vec<DetectionEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(RuntimeEvent::Detection(event))) => collected.push(event),
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }
    collected
}

#[tokio::test]
async fn inter_frame_floor_limits_capture_rate() {
    let config = DetectionConfig {
        // Requested faster than the floor allows; the floor wins.
        interval_ms: 50,
        min_frame_gap_ms: 250,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::looping(INPUT_SIZE, vec![Vec::new()]));
    let mut h = harness(config, detector).await;

    h.pipeline.start();
    tokio::time::sleep(Duration::from_millis(650)).await;
    h.pipeline.stop();

    let times = h.camera.capture_times();
    assert!(
        (2..=4).contains(&times.len()),
        "expected floor-limited captures, got {}",
        times.len()
    );
    for pair in times.windows(2) {
        let gap = pair[1].duration_since(pair[0]);
        assert!(
            gap >= Duration::from_millis(240),
            "captures only {gap:?} apart"
        );
    }
    drain_detection_events(&mut h.rx, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn batch_is_filtered_announced_and_signals_obstacle() {
    let config = DetectionConfig {
        interval_ms: 40,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::new(INPUT_SIZE));
    let mut h = harness(config, Arc::clone(&detector)).await;
    // cat at 0.9 and dog at 0.4: with the default 0.5 threshold only the
    // cat is emitted, and its proximity estimate marks it an obstacle.
    detector.push_batch(vec![raw(15, 0.9), raw(16, 0.4)]);

    h.pipeline.start();

    let events = drain_detection_events(&mut h.rx, Duration::from_millis(400)).await;
    h.pipeline.stop();

    assert!(events.iter().any(|e| matches!(e, DetectionEvent::Started)));
    let first_batch = events
        .iter()
        .find_map(|e| match e {
            DetectionEvent::Batch { objects } if !objects.is_empty() => Some(objects.clone()),
            _ => None,
        })
        .expect("a non-empty batch");
    assert_eq!(first_batch.len(), 1);
    assert_eq!(first_batch[0].label, "cat");
    assert_eq!(first_batch[0].id, "cat-0");

    let transcript = h.tts.transcript();
    assert!(
        transcript
            .iter()
            .any(|t| t.contains("cat") && t.contains("meter")),
        "transcript: {transcript:?}"
    );
    assert!(
        h.vibration
            .impulses()
            .iter()
            .any(|(impulse, _)| *impulse == Impulse::Heavy),
        "close detection should escalate to the obstacle cue"
    );
}

#[tokio::test]
async fn distant_objects_get_the_light_cue() {
    let config = DetectionConfig {
        interval_ms: 40,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::new(INPUT_SIZE));
    let mut h = harness(config, Arc::clone(&detector)).await;
    // 0.55 confidence → ~4.5 m estimate, beyond the 2 m obstacle cutoff.
    detector.push_batch(vec![raw(0, 0.55)]);

    h.pipeline.start();
    drain_detection_events(&mut h.rx, Duration::from_millis(300)).await;
    h.pipeline.stop();

    let impulses: Vec<_> = h.vibration.impulses().into_iter().map(|(i, _)| i).collect();
    assert!(impulses.contains(&Impulse::Light));
    assert!(!impulses.contains(&Impulse::Heavy));
}

#[tokio::test]
async fn empty_batches_are_not_announced() {
    let config = DetectionConfig {
        interval_ms: 40,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::looping(INPUT_SIZE, vec![Vec::new()]));
    let mut h = harness(config, detector).await;

    h.pipeline.start();
    let events = drain_detection_events(&mut h.rx, Duration::from_millis(250)).await;
    h.pipeline.stop();

    // Frames flowed (batches were emitted for UI state) but nothing spoke
    // and nothing buzzed.
    assert!(
        events
            .iter()
            .any(|e| matches!(e, DetectionEvent::Batch { objects } if objects.is_empty()))
    );
    assert!(h.tts.transcript().is_empty());
    assert_eq!(h.vibration.count(), 0);
}

#[tokio::test]
async fn announcements_toggle_keeps_haptics() {
    let config = DetectionConfig {
        interval_ms: 40,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::new(INPUT_SIZE));
    let mut h = harness(config, Arc::clone(&detector)).await;
    detector.push_batch(vec![raw(0, 0.8)]);
    h.pipeline.set_announcements_enabled(false);

    h.pipeline.start();
    drain_detection_events(&mut h.rx, Duration::from_millis(250)).await;
    h.pipeline.stop();

    assert!(h.tts.transcript().is_empty());
    assert!(h.vibration.count() > 0);
}

#[tokio::test]
async fn camera_permission_denied_reports_once_and_stays_idle() {
    let config = DetectionConfig::default();
    let detector = Arc::new(ScriptedDetector::new(INPUT_SIZE));
    let mut h = harness(config, detector).await;
    h.camera.deny_permission();

    h.pipeline.start();
    let events = drain_detection_events(&mut h.rx, Duration::from_millis(200)).await;

    let denials = events
        .iter()
        .filter(|e| matches!(e, DetectionEvent::Error { kind: ErrorKind::PermissionDenied, .. }))
        .count();
    assert_eq!(denials, 1);
    assert!(!events.iter().any(|e| matches!(e, DetectionEvent::Started)));
    assert!(!h.pipeline.is_detecting());
    assert_eq!(h.camera.capture_count(), 0);
}

#[tokio::test]
async fn stop_cancels_the_timer_and_discards_late_work() {
    let config = DetectionConfig {
        interval_ms: 30,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::looping(INPUT_SIZE, vec![Vec::new()]));
    let mut h = harness(config, detector).await;

    h.pipeline.start();
    tokio::time::sleep(Duration::from_millis(120)).await;
    h.pipeline.stop();
    assert!(!h.pipeline.is_detecting());

    let captured_at_stop = h.camera.capture_count();
    assert!(captured_at_stop > 0);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        h.camera.capture_count(),
        captured_at_stop,
        "timer kept firing after stop"
    );

    let events = drain_detection_events(&mut h.rx, Duration::from_millis(50)).await;
    assert!(events.iter().any(|e| matches!(e, DetectionEvent::Stopped)));
}

#[tokio::test]
async fn transient_capture_failures_keep_the_timer_running() {
    let config = DetectionConfig {
        interval_ms: 40,
        min_frame_gap_ms: 0,
        ..DetectionConfig::default()
    };
    let detector = Arc::new(ScriptedDetector::looping(INPUT_SIZE, vec![Vec::new()]));
    let mut h = harness(config, detector).await;
    h.camera.set_fail_all(true);

    h.pipeline.start();
    let events = drain_detection_events(&mut h.rx, Duration::from_millis(250)).await;

    let errors = events
        .iter()
        .filter(|e| matches!(e, DetectionEvent::Error { kind: ErrorKind::Device, .. }))
        .count();
    assert!(errors >= 2, "expected repeated retries, got {errors}");
    assert!(h.pipeline.is_detecting(), "errors must not stop the pipeline");

    // Recovery without a restart: the next tick after the fault clears
    // produces a batch again.
    h.camera.set_fail_all(false);
    let events = drain_detection_events(&mut h.rx, Duration::from_millis(200)).await;
    assert!(
        events
            .iter()
            .any(|e| matches!(e, DetectionEvent::Batch { .. }))
    );
    h.pipeline.stop();
}
