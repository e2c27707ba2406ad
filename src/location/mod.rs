//! Continuous position tracking with a single filtered subscription.

use crate::device::GeolocationDevice;
use crate::error::{AssistError, Result};
use crate::geo;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// A single geolocation sample. Immutable snapshot; each new sample
/// supersedes the previous one and only the last known fix is retained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above the reference ellipsoid.
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius in meters.
    pub accuracy: Option<f64>,
    /// Direction of travel in degrees, if moving.
    pub heading: Option<f64>,
    /// Ground speed in m/s, if moving.
    pub speed: Option<f64>,
}

impl Position {
    /// A position with only coordinates set.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Self::default()
        }
    }
}

/// Update filtering for a subscription.
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionOptions {
    /// Minimum movement in meters between delivered updates.
    pub min_distance_m: f64,
    /// Minimum time between delivered updates.
    pub min_interval: Duration,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            min_distance_m: 1.0,
            min_interval: Duration::from_millis(1000),
        }
    }
}

impl From<&crate::config::LocationConfig> for SubscriptionOptions {
    fn from(config: &crate::config::LocationConfig) -> Self {
        Self {
            min_distance_m: config.min_distance_m,
            min_interval: Duration::from_millis(config.min_interval_ms),
        }
    }
}

/// Handle to the active position stream.
///
/// Yields filtered fixes and transient stream errors. Dropping the handle
/// cancels the forwarding task.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Result<Position>>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next update, or `None` once the stream has ended.
    pub async fn recv(&mut self) -> Option<Result<Position>> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct ActiveSubscription {
    id: u64,
    cancel: CancellationToken,
}

/// Wraps the geolocation device behind fail-closed authorization, a
/// last-known snapshot, and at most one filtered update stream.
pub struct LocationTracker {
    device: Arc<dyn GeolocationDevice>,
    authorized: AtomicBool,
    last_known: Arc<Mutex<Option<Position>>>,
    active: Mutex<Option<ActiveSubscription>>,
    next_id: AtomicU64,
}

impl LocationTracker {
    pub fn new(device: Arc<dyn GeolocationDevice>) -> Self {
        Self {
            device,
            authorized: AtomicBool::new(false),
            last_known: Arc::new(Mutex::new(None)),
            active: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    /// Request location permission from the platform.
    ///
    /// Until a grant has been observed here, every other operation fails
    /// with [`PermissionDenied`](AssistError::PermissionDenied).
    ///
    /// # Errors
    ///
    /// Returns an error if the permission system itself is unreachable.
    pub async fn request_authorization(&self) -> Result<bool> {
        let granted = self.device.request_permission().await?;
        self.authorized.store(granted, Ordering::Relaxed);
        if granted {
            info!("location permission granted");
        } else {
            info!("location permission denied");
        }
        Ok(granted)
    }

    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::Relaxed)
    }

    fn ensure_authorized(&self) -> Result<()> {
        if self.is_authorized() {
            Ok(())
        } else {
            Err(AssistError::PermissionDenied(
                "location permission not granted".into(),
            ))
        }
    }

    /// Obtain a single fresh position fix.
    ///
    /// # Errors
    ///
    /// Fails with `PermissionDenied` before authorization and with
    /// `Unavailable` when the device cannot produce a fix.
    pub async fn current_position(&self) -> Result<Position> {
        self.ensure_authorized()?;
        let position = self.device.current_position().await?;
        *self
            .last_known
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(position);
        Ok(position)
    }

    /// The most recent fix observed through any path, if there is one.
    pub fn last_known(&self) -> Option<Position> {
        *self.last_known.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a filtered update stream.
    ///
    /// At most one stream is active at a time: any prior subscription is
    /// torn down first, and its handle stops yielding updates.
    ///
    /// # Errors
    ///
    /// Fails with `PermissionDenied` before authorization, or if the device
    /// stream cannot be started.
    pub async fn subscribe(&self, options: SubscriptionOptions) -> Result<Subscription> {
        self.ensure_authorized()?;
        self.unsubscribe();

        let raw = self.device.start_updates().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(16);

        tokio::spawn(forward_updates(
            raw,
            tx,
            Arc::clone(&self.last_known),
            options,
            cancel.clone(),
        ));

        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(ActiveSubscription {
            id,
            cancel: cancel.clone(),
        });
        debug!(id, "location subscription started");

        Ok(Subscription { id, rx, cancel })
    }

    /// Tear down the active update stream, if any. Idempotent.
    pub fn unsubscribe(&self) {
        let taken = self.active.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(active) = taken {
            active.cancel.cancel();
            self.device.stop_updates();
            debug!(id = active.id, "location subscription stopped");
        }
    }
}

/// Forward raw device updates through the distance/interval filters.
///
/// Every raw fix refreshes the last-known snapshot even when filtered out
/// of the subscriber's stream.
async fn forward_updates(
    mut raw: mpsc::Receiver<Result<Position>>,
    tx: mpsc::Sender<Result<Position>>,
    last_known: Arc<Mutex<Option<Position>>>,
    options: SubscriptionOptions,
    cancel: CancellationToken,
) {
    let mut last_delivered: Option<(Position, Instant)> = None;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            update = raw.recv() => match update {
                Some(Ok(position)) => {
                    *last_known.lock().unwrap_or_else(|e| e.into_inner()) = Some(position);
                    let deliver = match &last_delivered {
                        Some((previous, at)) => {
                            at.elapsed() >= options.min_interval
                                && geo::distance_meters(previous, &position)
                                    >= options.min_distance_m
                        }
                        None => true,
                    };
                    if deliver {
                        last_delivered = Some((position, Instant::now()));
                        if tx.send(Ok(position)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    if tx.send(Err(e)).await.is_err() {
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::sim::SimGeolocation;

    #[tokio::test]
    async fn operations_fail_closed_without_permission() {
        let device = Arc::new(SimGeolocation::new(Position::new(51.5, -0.12)));
        let tracker = LocationTracker::new(device);

        assert!(matches!(
            tracker.current_position().await,
            Err(AssistError::PermissionDenied(_))
        ));
        assert!(matches!(
            tracker.subscribe(SubscriptionOptions::default()).await,
            Err(AssistError::PermissionDenied(_))
        ));
        assert!(tracker.last_known().is_none());
    }

    #[tokio::test]
    async fn denied_permission_stays_closed() {
        let device = Arc::new(SimGeolocation::new(Position::new(51.5, -0.12)));
        device.deny_permission();
        let tracker = LocationTracker::new(Arc::clone(&device) as Arc<dyn GeolocationDevice>);

        let granted = tracker.request_authorization().await.expect("request");
        assert!(!granted);
        assert!(tracker.current_position().await.is_err());
    }

    #[tokio::test]
    async fn one_shot_fix_updates_last_known() {
        let device = Arc::new(SimGeolocation::new(Position::new(51.5, -0.12)));
        let tracker = LocationTracker::new(Arc::clone(&device) as Arc<dyn GeolocationDevice>);
        tracker.request_authorization().await.expect("request");

        let fix = tracker.current_position().await.expect("fix");
        assert!((fix.latitude - 51.5).abs() < f64::EPSILON);
        assert_eq!(tracker.last_known(), Some(fix));
    }

    #[tokio::test]
    async fn resubscribe_tears_down_prior_stream() {
        let device = Arc::new(SimGeolocation::new(Position::new(51.5, -0.12)));
        let tracker = LocationTracker::new(Arc::clone(&device) as Arc<dyn GeolocationDevice>);
        tracker.request_authorization().await.expect("request");

        let mut first = tracker
            .subscribe(SubscriptionOptions {
                min_distance_m: 0.0,
                min_interval: Duration::ZERO,
            })
            .await
            .expect("first subscription");
        let mut second = tracker
            .subscribe(SubscriptionOptions {
                min_distance_m: 0.0,
                min_interval: Duration::ZERO,
            })
            .await
            .expect("second subscription");
        assert_ne!(first.id(), second.id());

        device.set_position(Position::new(51.6, -0.12));

        let update = second.recv().await.expect("stream open").expect("fix");
        assert!((update.latitude - 51.6).abs() < f64::EPSILON);

        // The first stream was torn down and yields nothing further.
        let closed = tokio::time::timeout(Duration::from_millis(100), first.recv()).await;
        assert!(matches!(closed, Ok(None)));
    }

    #[tokio::test]
    async fn min_distance_filter_drops_small_moves() {
        let device = Arc::new(SimGeolocation::new(Position::new(0.0, 0.0)));
        let tracker = LocationTracker::new(Arc::clone(&device) as Arc<dyn GeolocationDevice>);
        tracker.request_authorization().await.expect("request");

        let mut sub = tracker
            .subscribe(SubscriptionOptions {
                min_distance_m: 50.0,
                min_interval: Duration::ZERO,
            })
            .await
            .expect("subscription");

        // First update always delivers.
        device.set_position(Position::new(0.0, 0.0));
        sub.recv().await.expect("open").expect("fix");

        // ~11 m north: filtered, but still refreshes last_known.
        device.set_position(Position::new(0.0001, 0.0));
        // ~111 m north of the delivered fix: passes the filter.
        device.set_position(Position::new(0.001, 0.0));

        let update = sub.recv().await.expect("open").expect("fix");
        assert!((update.latitude - 0.001).abs() < f64::EPSILON);
        let last = tracker.last_known().expect("last known");
        assert!((last.latitude - 0.001).abs() < f64::EPSILON);
    }
}
