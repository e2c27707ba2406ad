//! Turn-by-turn navigation state machine.
//!
//! One session at a time: Idle → Active → (Arrived | Stopped) → Idle.
//! While active, a periodic timer re-evaluates the last known position;
//! arrival is gated on overall distance to the destination, and step
//! advancement is time-driven.

pub mod destinations;
pub mod route;

pub use destinations::{Destination, DestinationCatalog};
pub use route::{RouteStep, TurnDirection};

use crate::config::NavigationConfig;
use crate::device::Impulse;
use crate::error::{AssistError, ErrorKind, Result};
use crate::geo::{self, Compass};
use crate::haptics::HapticSignaler;
use crate::location::{LocationTracker, Subscription, SubscriptionOptions};
use crate::runtime::{EventSender, RuntimeEvent};
use crate::speech::SpeechQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Navigation session events.
#[derive(Debug, Clone)]
pub enum NavEvent {
    /// A session became active.
    Started {
        destination_id: String,
        steps: usize,
    },
    /// The current step index moved (timer advancement or manual).
    StepChanged { index: usize, instruction: String },
    /// The destination was reached. Emitted exactly once per session.
    Arrived { destination_id: String },
    /// The session was stopped before arrival.
    Stopped,
    /// A failure surfaced by the session (start or tracking).
    Error { kind: ErrorKind, message: String },
}

struct NavSession {
    id: u64,
    destination: Destination,
    steps: Vec<RouteStep>,
    current: usize,
    cancel: CancellationToken,
}

enum TickAction {
    Arrived {
        destination: Destination,
        cancel: CancellationToken,
    },
    Advanced {
        index: usize,
        instruction: String,
    },
    Hold,
}

/// Owns the active route and step index and drives announcements.
pub struct NavigationOrchestrator {
    catalog: DestinationCatalog,
    location: Arc<LocationTracker>,
    speech: Arc<SpeechQueue>,
    haptics: Arc<HapticSignaler>,
    config: NavigationConfig,
    subscription: SubscriptionOptions,
    events: EventSender,
    session: Mutex<Option<NavSession>>,
    session_seq: AtomicU64,
}

impl NavigationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        catalog: DestinationCatalog,
        location: Arc<LocationTracker>,
        speech: Arc<SpeechQueue>,
        haptics: Arc<HapticSignaler>,
        config: NavigationConfig,
        subscription: SubscriptionOptions,
        events: EventSender,
    ) -> Self {
        Self {
            catalog,
            location,
            speech,
            haptics,
            config,
            subscription,
            events,
            session: Mutex::new(None),
            session_seq: AtomicU64::new(0),
        }
    }

    pub fn is_active(&self) -> bool {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// The active route, if any.
    pub fn route(&self) -> Option<Vec<RouteStep>> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.steps.clone())
    }

    /// Index and snapshot of the current step, if a session is active.
    pub fn current_step(&self) -> Option<(usize, RouteStep)> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| (s.current, s.steps[s.current].clone()))
    }

    /// Compass direction and distance from the last known position to the
    /// active destination.
    pub fn destination_heading(&self) -> Option<(Compass, f64)> {
        let position = self.location.last_known()?;
        let guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let session = guard.as_ref()?;
        let target = &session.destination.position;
        Some((
            geo::bearing_to_compass(geo::bearing_degrees(&position, target)),
            geo::distance_meters(&position, target),
        ))
    }

    /// Start navigating to a destination (by id or name).
    ///
    /// Resolves the destination, obtains a position fix, generates the
    /// route, announces step 0, and starts the evaluation timer. Any
    /// already-active session is stopped first.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for an unknown reference, `PermissionDenied` or
    /// `Unavailable` when no position is obtainable. Each failure is also
    /// emitted once as [`NavEvent::Error`], and the machine stays Idle.
    pub async fn start(self: &Arc<Self>, destination_ref: &str) -> Result<()> {
        self.stop();

        let destination = match self.catalog.resolve(destination_ref) {
            Some(destination) => destination.clone(),
            None => {
                let err =
                    AssistError::InvalidInput(format!("unknown destination '{destination_ref}'"));
                self.emit_error(&err);
                return Err(err);
            }
        };

        let origin = match self.location.current_position().await {
            Ok(position) => position,
            Err(e) => {
                self.emit_error(&e);
                return Err(e);
            }
        };

        let steps = route::generate_route(
            &origin,
            &destination.position,
            &mut rand::thread_rng(),
        );
        let subscription = match self.location.subscribe(self.subscription).await {
            Ok(subscription) => subscription,
            Err(e) => {
                self.emit_error(&e);
                return Err(e);
            }
        };

        let id = self.session_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let first_instruction = steps[0].instruction.clone();
        let step_count = steps.len();
        {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            *guard = Some(NavSession {
                id,
                destination: destination.clone(),
                steps,
                current: 0,
                cancel: cancel.clone(),
            });
        }

        info!(destination = %destination.name, "navigation started");
        let _ = self.events.send(RuntimeEvent::Navigation(NavEvent::Started {
            destination_id: destination.id.clone(),
            steps: step_count,
        }));
        self.speech.enqueue_default(&first_instruction);
        self.haptics.trigger(Impulse::Medium);

        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_session(id, cancel, subscription).await });
        Ok(())
    }

    /// Stop the active session, tearing down its timer and location
    /// subscription. Idempotent when already Idle.
    pub fn stop(&self) {
        let taken = self
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(session) = taken {
            session.cancel.cancel();
            self.location.unsubscribe();
            info!("navigation stopped");
            let _ = self.events.send(RuntimeEvent::Navigation(NavEvent::Stopped));
        }
    }

    /// Manually advance to the next step. Returns `false` when Idle or
    /// already on the final step.
    pub fn next_step(&self) -> bool {
        let announced = {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            let Some(session) = guard.as_mut() else {
                return false;
            };
            if session.current + 1 >= session.steps.len() {
                return false;
            }
            session.steps[session.current].completed = true;
            session.current += 1;
            (session.current, session.steps[session.current].instruction.clone())
        };
        self.announce_step(announced.0, announced.1);
        true
    }

    /// Manually step back. Returns `false` when Idle or on step 0.
    pub fn previous_step(&self) -> bool {
        let announced = {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            let Some(session) = guard.as_mut() else {
                return false;
            };
            if session.current == 0 {
                return false;
            }
            session.current -= 1;
            session.steps[session.current].completed = false;
            (session.current, session.steps[session.current].instruction.clone())
        };
        self.announce_step(announced.0, announced.1);
        true
    }

    fn announce_step(&self, index: usize, instruction: String) {
        self.speech.enqueue_default(&instruction);
        let _ = self
            .events
            .send(RuntimeEvent::Navigation(NavEvent::StepChanged {
                index,
                instruction,
            }));
    }

    fn emit_error(&self, error: &AssistError) {
        warn!("navigation error: {error}");
        let _ = self.events.send(RuntimeEvent::Navigation(NavEvent::Error {
            kind: error.kind(),
            message: error.to_string(),
        }));
    }

    /// Session drive loop: drain position updates, evaluate on each tick.
    ///
    /// Slow async work elsewhere never blocks this timer; conversely, every
    /// evaluation re-checks that this session is still the active one, so a
    /// stop that raced an in-flight tick wins.
    async fn run_session(
        self: Arc<Self>,
        session_id: u64,
        cancel: CancellationToken,
        mut subscription: Subscription,
    ) {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.step_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first interval tick completes immediately; evaluation starts
        // one full period after the session began.
        ticker.tick().await;

        let mut stream_open = true;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                update = subscription.recv(), if stream_open => match update {
                    Some(Ok(_position)) => {
                        // The tracker already refreshed last_known.
                    }
                    Some(Err(e)) => {
                        // Transient tracking error; the next tick carries on.
                        self.emit_error(&e);
                    }
                    None => stream_open = false,
                },
                _ = ticker.tick() => {
                    if !self.evaluate_tick(session_id) {
                        break;
                    }
                }
            }
        }
    }

    /// One timer evaluation. Returns `false` when the session is over.
    ///
    /// Arrival is gated on distance to the destination only. Step
    /// advancement is time-driven: each tick completes the current step and
    /// announces the next, regardless of where the user actually is.
    // TODO: gate step advancement on proximity to per-step waypoints once
    // the route generator attaches coordinates to each step.
    fn evaluate_tick(&self, session_id: u64) -> bool {
        let Some(position) = self.location.last_known() else {
            debug!("no position fix yet; skipping evaluation");
            return true;
        };

        let action = {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            let arrived = {
                let Some(session) = guard.as_mut() else {
                    return false;
                };
                if session.id != session_id {
                    return false;
                }
                let remaining = geo::distance_meters(&position, &session.destination.position);
                remaining <= self.config.arrival_threshold_m
            };
            if arrived {
                // Take the session out under the lock so arrival fires once.
                let Some(session) = guard.take() else {
                    return false;
                };
                TickAction::Arrived {
                    destination: session.destination,
                    cancel: session.cancel,
                }
            } else {
                let Some(session) = guard.as_mut() else {
                    return false;
                };
                if session.current + 1 < session.steps.len() {
                    session.steps[session.current].completed = true;
                    session.current += 1;
                    TickAction::Advanced {
                        index: session.current,
                        instruction: session.steps[session.current].instruction.clone(),
                    }
                } else {
                    TickAction::Hold
                }
            }
        };

        match action {
            TickAction::Arrived {
                destination,
                cancel,
            } => {
                cancel.cancel();
                self.location.unsubscribe();
                info!(destination = %destination.name, "arrived");
                let text = match &destination.description {
                    Some(description) => {
                        format!("You have arrived at {}. {description}", destination.name)
                    }
                    None => format!("You have arrived at {}.", destination.name),
                };
                self.speech.enqueue_default(&text);
                self.haptics.signal_arrival();
                let _ = self.events.send(RuntimeEvent::Navigation(NavEvent::Arrived {
                    destination_id: destination.id,
                }));
                false
            }
            TickAction::Advanced { index, instruction } => {
                self.speech.enqueue_default(&instruction);
                self.haptics.signal_turn();
                let _ = self
                    .events
                    .send(RuntimeEvent::Navigation(NavEvent::StepChanged {
                        index,
                        instruction,
                    }));
                true
            }
            TickAction::Hold => true,
        }
    }
}
