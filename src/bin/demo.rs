//! Demo: wires simulated devices into the full engine and walks a short
//! route while the detector reports a couple of scene batches.
//!
//! Run with `RUST_LOG=info cargo run` to watch the announcement stream.

use sightline::config::AssistConfig;
use sightline::detect::{DetectionEvent, DetectionPipeline};
use sightline::device::sim::{SimCamera, SimGeolocation, SimTts, SimVibration, test_frame_png};
use sightline::geo;
use sightline::haptics::HapticSignaler;
use sightline::location::{LocationTracker, Position, SubscriptionOptions};
use sightline::model::{ModelProvider, RawDetection, ScriptedDetector};
use sightline::navigation::{DestinationCatalog, NavEvent, NavigationOrchestrator};
use sightline::platform;
use sightline::runtime::{RuntimeEvent, event_bus};
use sightline::speech::SpeechQueue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut config = AssistConfig::default();
    // Fast cadence so the demo walk finishes in a few seconds.
    config.navigation.step_interval_ms = 400;
    config.detection.interval_ms = 600;
    config.detection.min_frame_gap_ms = 300;

    let capabilities = platform::detect();
    let (events, mut rx) = event_bus();

    // Devices: all simulated. A real host passes platform bindings instead.
    let tts = Arc::new(SimTts::with_latency(Duration::from_millis(30)));
    let vibration = Arc::new(SimVibration::new());
    let catalog = DestinationCatalog::builtin();
    let destination = catalog
        .resolve("park-gate")
        .ok_or_else(|| anyhow::anyhow!("builtin catalog is missing park-gate"))?
        .clone();
    let start = Position::new(51.5007, -0.1246);
    let geolocation = Arc::new(SimGeolocation::new(start));
    let camera = Arc::new(SimCamera::with_frame(test_frame_png(64, 64, [90, 120, 90])));

    let speech = Arc::new(SpeechQueue::new(
        tts.clone(),
        &config.speech,
        events.clone(),
    ));
    let haptics = Arc::new(HapticSignaler::new(
        vibration.clone(),
        &config.haptics,
        capabilities.as_ref(),
    ));
    let location = Arc::new(LocationTracker::new(geolocation.clone()));
    location.request_authorization().await?;

    // Prefer the bundled ONNX model; fall back to the scripted detector
    // when no model file ships with the demo.
    let onnx = Arc::new(ModelProvider::onnx(config.model.clone()));
    let model = match onnx.load().await {
        Ok(_) => onnx,
        Err(e) => {
            warn!("no usable detector model ({e}); using scripted detections");
            let scripted = ScriptedDetector::looping(
                config.model.input_size,
                vec![
                    vec![RawDetection {
                        class_index: 0,
                        score: 0.87,
                        bbox: [0.2, 0.3, 0.8, 0.7],
                    }],
                    Vec::new(),
                    vec![
                        RawDetection {
                            class_index: 16,
                            score: 0.74,
                            bbox: [0.5, 0.1, 0.9, 0.4],
                        },
                        RawDetection {
                            class_index: 13,
                            score: 0.62,
                            bbox: [0.4, 0.6, 0.9, 0.95],
                        },
                    ],
                ],
            );
            Arc::new(ModelProvider::prebuilt(Arc::new(scripted)))
        }
    };

    let detection = Arc::new(DetectionPipeline::new(
        camera.clone(),
        model,
        speech.clone(),
        haptics.clone(),
        config.detection.clone(),
        capabilities.as_ref(),
        events.clone(),
    ));
    let navigation = Arc::new(NavigationOrchestrator::new(
        catalog,
        location.clone(),
        speech.clone(),
        haptics.clone(),
        config.navigation.clone(),
        SubscriptionOptions::from(&config.location),
        events.clone(),
    ));

    detection.start();
    navigation.start("park-gate").await?;

    // Walk the simulated device toward the destination in ten strides.
    let walker = {
        let geolocation = geolocation.clone();
        let target = destination.position;
        tokio::spawn(async move {
            let mut current = start;
            for _ in 0..10 {
                tokio::time::sleep(Duration::from_millis(350)).await;
                current = Position::new(
                    current.latitude + (target.latitude - current.latitude) * 0.45,
                    current.longitude + (target.longitude - current.longitude) * 0.45,
                );
                geolocation.set_position(current);
            }
        })
    };

    let deadline = tokio::time::sleep(Duration::from_secs(15));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            () = &mut deadline => {
                warn!("demo timed out before arrival");
                break;
            }
            event = rx.recv() => match event {
                Ok(RuntimeEvent::Navigation(NavEvent::Arrived { destination_id })) => {
                    info!("arrived at {destination_id}");
                    break;
                }
                Ok(RuntimeEvent::Navigation(NavEvent::StepChanged { index, instruction })) => {
                    info!("step {index}: {instruction}");
                }
                Ok(RuntimeEvent::Detection(DetectionEvent::Batch { objects })) if !objects.is_empty() => {
                    let labels: Vec<&str> = objects.iter().map(|o| o.label.as_str()).collect();
                    info!("detected: {}", labels.join(", "));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("event bus closed: {e}");
                    break;
                }
            }
        }
    }

    detection.stop();
    navigation.stop();
    walker.abort();

    // Let the last announcements drain, then show what was spoken.
    tokio::time::sleep(Duration::from_millis(300)).await;
    if let Some(position) = location.last_known() {
        info!(
            "final distance to {}: {:.1} m",
            destination.name,
            geo::distance_meters(&position, &destination.position)
        );
    }
    for line in tts.transcript() {
        info!("spoken: {line}");
    }
    info!("haptic impulses fired: {}", vibration.count());
    Ok(())
}
