//! Runtime events emitted by the engine for UI and observability.
//!
//! One broadcast bus carries everything the screens need to render:
//! navigation progress, detection batches, speech lifecycle, and every
//! non-fatal error. Payloads are kept lightweight so emitting never blocks
//! a timer path.

use crate::detect::DetectionEvent;
use crate::navigation::NavEvent;
use crate::speech::SpeechEvent;
use tokio::sync::broadcast;

/// Default bus capacity; slow subscribers lag rather than block producers.
pub const EVENT_BUS_CAPACITY: usize = 64;

/// Events describing what the engine is doing "right now".
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// Speech queue lifecycle (started/finished/cleared).
    Speech(SpeechEvent),
    /// Navigation session progress and failures.
    Navigation(NavEvent),
    /// Detection batches and failures.
    Detection(DetectionEvent),
}

/// Sender half of the event bus.
pub type EventSender = broadcast::Sender<RuntimeEvent>;

/// Receiver half of the event bus.
pub type EventReceiver = broadcast::Receiver<RuntimeEvent>;

/// Create an event bus with the default capacity.
pub fn event_bus() -> (EventSender, EventReceiver) {
    broadcast::channel(EVENT_BUS_CAPACITY)
}
