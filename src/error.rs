//! Error types for the sightline engine.

/// Top-level error type for the navigation and perception engine.
#[derive(Debug, thiserror::Error)]
pub enum AssistError {
    /// A required permission (location, camera) was not granted.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A resource is not obtainable right now (no position fix, no TTS engine).
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Caller-supplied input could not be resolved (unknown destination).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A single device call failed (frame capture, inference, speech).
    #[error("device error: {0}")]
    Device(String),

    /// Model loading or inference setup error.
    #[error("model error: {0}")]
    Model(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Coarse classification of an [`AssistError`], carried in runtime events.
///
/// Events are broadcast and must be `Clone`; errors themselves are not, so
/// event payloads carry the kind plus a rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    PermissionDenied,
    Unavailable,
    InvalidInput,
    Device,
    Model,
    Config,
    Io,
    Channel,
}

impl AssistError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Unavailable(_) => ErrorKind::Unavailable,
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Device(_) => ErrorKind::Device,
            Self::Model(_) => ErrorKind::Model,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::Channel(_) => ErrorKind::Channel,
        }
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AssistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(
            AssistError::InvalidInput("x".into()).kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            AssistError::PermissionDenied("camera".into()).kind(),
            ErrorKind::PermissionDenied
        );
        assert_eq!(
            AssistError::Device("capture".into()).kind(),
            ErrorKind::Device
        );
    }
}
