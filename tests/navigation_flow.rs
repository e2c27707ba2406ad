//! End-to-end navigation scenarios over simulated devices.

use sightline::config::AssistConfig;
use sightline::device::Impulse;
use sightline::device::sim::{SimGeolocation, SimTts, SimVibration};
use sightline::error::{AssistError, ErrorKind};
use sightline::haptics::HapticSignaler;
use sightline::location::{LocationTracker, Position, SubscriptionOptions};
use sightline::navigation::{Destination, DestinationCatalog, NavEvent, NavigationOrchestrator};
use sightline::platform::StaticCapabilities;
use sightline::runtime::{EventReceiver, RuntimeEvent, event_bus};
use sightline::speech::SpeechQueue;
use std::sync::Arc;
use std::time::Duration;

const START: Position = Position {
    latitude: 51.5000,
    longitude: -0.1240,
    altitude: None,
    accuracy: None,
    heading: None,
    speed: None,
};

/// ~300 m north of `START`.
fn destination_300m() -> Destination {
    Destination {
        id: "target".to_owned(),
        name: "Target".to_owned(),
        position: Position::new(51.50269, -0.1240),
        description: None,
    }
}

struct Harness {
    navigation: Arc<NavigationOrchestrator>,
    geolocation: Arc<SimGeolocation>,
    tts: Arc<SimTts>,
    vibration: Arc<SimVibration>,
    rx: EventReceiver,
}

async fn harness(destination: Destination, step_interval_ms: u64) -> Harness {
    let mut config = AssistConfig::default();
    config.navigation.step_interval_ms = step_interval_ms;

    let (events, rx) = event_bus();
    let tts = Arc::new(SimTts::with_latency(Duration::from_millis(2)));
    let vibration = Arc::new(SimVibration::new());
    let geolocation = Arc::new(SimGeolocation::new(START));

    let speech = Arc::new(SpeechQueue::new(
        tts.clone(),
        &config.speech,
        events.clone(),
    ));
    let haptics = Arc::new(HapticSignaler::new(
        vibration.clone(),
        &config.haptics,
        &StaticCapabilities::new(true, true),
    ));
    let location = Arc::new(LocationTracker::new(geolocation.clone()));
    location.request_authorization().await.expect("authorize");

    let navigation = Arc::new(NavigationOrchestrator::new(
        DestinationCatalog::new(vec![destination]),
        location,
        speech,
        haptics,
        config.navigation.clone(),
        SubscriptionOptions {
            min_distance_m: 0.0,
            min_interval: Duration::ZERO,
        },
        events,
    ));

    Harness {
        navigation,
        geolocation,
        tts,
        vibration,
        rx,
    }
}

/// Drain navigation events for `window`, collecting them.
async fn drain_nav_events(rx: &mut EventReceiver, window: Duration) -> Vec<NavEvent> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(RuntimeEvent::Navigation(event))) => collected.push(event),
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }
    collected
}

#[tokio::test]
async fn unknown_destination_reports_invalid_input_once_and_stays_idle() {
    let mut h = harness(destination_300m(), 10_000).await;

    let result = h.navigation.start("atlantis").await;
    assert!(matches!(result, Err(AssistError::InvalidInput(_))));
    assert!(!h.navigation.is_active());

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(150)).await;
    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, NavEvent::Error { kind: ErrorKind::InvalidInput, .. }))
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(!events.iter().any(|e| matches!(e, NavEvent::Started { .. })));
    assert!(h.tts.transcript().is_empty());
}

#[tokio::test]
async fn location_unavailable_keeps_the_machine_idle() {
    let mut h = harness(destination_300m(), 10_000).await;
    h.geolocation.set_unavailable(true);

    let result = h.navigation.start("target").await;
    assert!(matches!(result, Err(AssistError::Unavailable(_))));
    assert!(!h.navigation.is_active());

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(150)).await;
    let errors: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, NavEvent::Error { kind: ErrorKind::Unavailable, .. }))
        .collect();
    assert_eq!(errors.len(), 1);
}

#[tokio::test]
async fn start_announces_first_step_and_fires_medium_haptic() {
    let mut h = harness(destination_300m(), 10_000).await;

    h.navigation.start("target").await.expect("start");
    assert!(h.navigation.is_active());

    let route = h.navigation.route().expect("active route");
    assert_eq!(route.len(), 6);
    let (index, step) = h.navigation.current_step().expect("current step");
    assert_eq!(index, 0);
    assert!(step.instruction.starts_with("Head "));

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(150)).await;
    assert!(
        events
            .iter()
            .any(|e| matches!(e, NavEvent::Started { destination_id, steps }
                if destination_id == "target" && *steps == 6))
    );

    let transcript = h.tts.transcript();
    assert_eq!(transcript.first(), Some(&route[0].instruction));
    assert!(
        h.vibration
            .impulses()
            .iter()
            .any(|(impulse, _)| *impulse == Impulse::Medium)
    );
}

#[tokio::test]
async fn steps_advance_on_the_timer_until_the_final_step() {
    let mut h = harness(destination_300m(), 40).await;

    h.navigation.start("target").await.expect("start");
    // Position never converges; only the clock drives step changes.
    let events = drain_nav_events(&mut h.rx, Duration::from_millis(600)).await;

    let indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            NavEvent::StepChanged { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    // Exactly five advancements (1 through 5), then the machine holds on
    // the final step until arrival.
    assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    assert!(!events.iter().any(|e| matches!(e, NavEvent::Arrived { .. })));
    assert!(h.navigation.is_active());

    let route = h.navigation.route().expect("route");
    assert!(route[..5].iter().all(|s| s.completed));
    assert!(!route[5].completed);

    h.navigation.stop();
    assert!(!h.navigation.is_active());
}

#[tokio::test]
async fn arrival_fires_exactly_once_and_tears_down_the_subscription() {
    let mut h = harness(destination_300m(), 40).await;
    let target = destination_300m().position;

    h.navigation.start("target").await.expect("start");

    // Converge on the destination in a few strides.
    for factor in [0.5, 0.15, 0.00001] {
        tokio::time::sleep(Duration::from_millis(30)).await;
        h.geolocation.set_position(Position::new(
            START.latitude + (target.latitude - START.latitude) * (1.0 - factor),
            START.longitude,
        ));
    }

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(500)).await;
    let arrivals = events
        .iter()
        .filter(|e| matches!(e, NavEvent::Arrived { .. }))
        .count();
    assert_eq!(arrivals, 1);
    assert!(!h.navigation.is_active());

    // Further position updates produce no orchestrator activity.
    for _ in 0..3 {
        h.geolocation.set_position(Position::new(51.6, -0.2));
    }
    let after = drain_nav_events(&mut h.rx, Duration::from_millis(150)).await;
    assert!(after.is_empty(), "activity after arrival: {after:?}");

    let transcript = h.tts.transcript();
    let arrival_lines = transcript
        .iter()
        .filter(|t| t.contains("You have arrived"))
        .count();
    assert_eq!(arrival_lines, 1);
    assert!(
        h.vibration
            .impulses()
            .iter()
            .any(|(impulse, _)| *impulse == Impulse::Success)
    );
}

#[tokio::test]
async fn manual_steps_clamp_at_both_ends() {
    let h = harness(destination_300m(), 60_000).await;

    // Idle: manual stepping is a no-op.
    assert!(!h.navigation.next_step());
    assert!(!h.navigation.previous_step());

    h.navigation.start("target").await.expect("start");
    assert!(!h.navigation.previous_step(), "already on step 0");

    for expected in 1..=5 {
        assert!(h.navigation.next_step());
        let (index, _) = h.navigation.current_step().expect("step");
        assert_eq!(index, expected);
    }
    assert!(!h.navigation.next_step(), "clamped at the final step");

    for expected in (0..=4).rev() {
        assert!(h.navigation.previous_step());
        let (index, _) = h.navigation.current_step().expect("step");
        assert_eq!(index, expected);
    }
    assert!(!h.navigation.previous_step(), "clamped at step 0");

    h.navigation.stop();
}

#[tokio::test]
async fn stop_is_idempotent_and_emits_one_stopped_event() {
    let mut h = harness(destination_300m(), 10_000).await;
    h.navigation.start("target").await.expect("start");

    h.navigation.stop();
    h.navigation.stop();
    h.navigation.stop();

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(150)).await;
    let stops = events
        .iter()
        .filter(|e| matches!(e, NavEvent::Stopped))
        .count();
    assert_eq!(stops, 1);
    assert!(!h.navigation.is_active());
}

#[tokio::test]
async fn transient_stream_errors_do_not_end_the_session() {
    let mut h = harness(destination_300m(), 50).await;
    h.navigation.start("target").await.expect("start");

    tokio::time::sleep(Duration::from_millis(20)).await;
    h.geolocation.push_stream_error("jammed");

    let events = drain_nav_events(&mut h.rx, Duration::from_millis(200)).await;
    assert!(events.iter().any(|e| matches!(
        e,
        NavEvent::Error { kind: ErrorKind::Device, .. }
    )));
    // The timer kept running: steps still advanced afterwards.
    assert!(
        events
            .iter()
            .any(|e| matches!(e, NavEvent::StepChanged { .. }))
    );
    assert!(h.navigation.is_active());
    h.navigation.stop();
}
