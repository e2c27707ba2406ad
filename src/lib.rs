//! Sightline: assistive navigation and scene-perception engine.
//!
//! Two closed loops share one spoken/haptic output channel:
//!
//! - **Navigation**: location updates → [`NavigationOrchestrator`] →
//!   [`SpeechQueue`] / [`HapticSignaler`]
//! - **Detection**: camera frames → [`ModelProvider`] inference →
//!   [`DetectionPipeline`] → [`SpeechQueue`] / [`HapticSignaler`]
//!
//! # Architecture
//!
//! Components are explicitly constructed and wired by the host (no global
//! singletons) and communicate over async channels:
//! - **SpeechQueue**: one consumer task serializes all utterances FIFO
//! - **HapticSignaler**: semantic vibration cues, capability-gated
//! - **LocationTracker**: fail-closed geolocation with a single filtered
//!   update subscription
//! - **NavigationOrchestrator**: the route/step state machine on a
//!   periodic evaluation timer
//! - **DetectionPipeline**: timer-driven frame capture → inference →
//!   announcement, with an inter-frame floor
//! - **ModelProvider**: loads and warms the detector once, reporting
//!   `{progress, status}`
//!
//! Host platform access (text-to-speech, vibration, geolocation, camera)
//! lives behind the [`device`] traits; observable state flows out through
//! the [`runtime::RuntimeEvent`] broadcast bus.

pub mod config;
pub mod detect;
pub mod device;
pub mod error;
pub mod geo;
pub mod haptics;
pub mod location;
pub mod model;
pub mod navigation;
pub mod platform;
pub mod runtime;
pub mod settings;
pub mod speech;

pub use config::AssistConfig;
pub use detect::DetectionPipeline;
pub use error::{AssistError, ErrorKind, Result};
pub use haptics::HapticSignaler;
pub use location::{LocationTracker, Position};
pub use model::ModelProvider;
pub use navigation::NavigationOrchestrator;
pub use runtime::{RuntimeEvent, event_bus};
pub use settings::{SettingsStore, apply_settings};
pub use speech::SpeechQueue;
