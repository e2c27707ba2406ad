//! Platform capability queries.
//!
//! Components that depend on optional hardware (vibration motor, camera)
//! query a [`Capabilities`] implementation once at construction instead of
//! branching on the operating system at each call site.

/// Host capability queries, answered once at startup.
pub trait Capabilities: Send + Sync {
    /// Whether the host has a vibration motor the engine may drive.
    fn supports_haptics(&self) -> bool;

    /// Whether the host has a camera the engine may sample.
    fn supports_camera(&self) -> bool;
}

/// Capabilities of the host this binary runs on.
///
/// The engine itself is device-agnostic; actual hardware access lives behind
/// the [`device`](crate::device) traits, so the host build is assumed capable
/// of both unless the embedder says otherwise via [`StaticCapabilities`].
pub struct HostCapabilities;

impl Capabilities for HostCapabilities {
    fn supports_haptics(&self) -> bool {
        true
    }

    fn supports_camera(&self) -> bool {
        true
    }
}

/// Fixed capability answers, for embedders and tests.
pub struct StaticCapabilities {
    haptics: bool,
    camera: bool,
}

impl StaticCapabilities {
    pub fn new(haptics: bool, camera: bool) -> Self {
        Self { haptics, camera }
    }
}

impl Capabilities for StaticCapabilities {
    fn supports_haptics(&self) -> bool {
        self.haptics
    }

    fn supports_camera(&self) -> bool {
        self.camera
    }
}

/// Create the platform-appropriate capability report.
pub fn detect() -> Box<dyn Capabilities> {
    Box::new(HostCapabilities)
}
