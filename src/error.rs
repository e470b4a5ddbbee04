//! Unified error handling for the benchmark execution core.
//!
//! Mirrors the error taxonomy a referee box actually needs to distinguish:
//! a bad event file is not the same failure as a robot sending garbage, and
//! neither is the same as a UDP port collision that retries.

use thiserror::Error;

/// Main error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Event/config malformed or internally inconsistent — not recoverable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A peer (robot or script) violated the wire protocol.
    #[error("protocol error (local detection): {0}")]
    ProtocolLocal(String),

    /// A peer reported a protocol-level failure back to us.
    #[error("protocol error (remote report): {0}")]
    ProtocolRemote(String),

    /// A resource (port, socket) was transiently unavailable; caller may retry.
    #[error("resource transiently unavailable: {0}")]
    ResourceTransient(String),

    /// An internal invariant was violated. Not recoverable; the executor
    /// that raises this should terminate rather than continue in an
    /// inconsistent state.
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    /// I/O failure underneath sockets, files, etc.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Resource not found (e.g. unknown team in the robot registry).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid argument passed to an API.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Catch-all for error types outside the taxonomy above.
    #[error("{0}")]
    Other(String),
}

/// Convenience alias for `Result<T, CoreError>`.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::Config(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for CoreError {
    fn from(err: toml::ser::Error) -> Self {
        CoreError::Serialization(format!("TOML serialization error: {err}"))
    }
}

impl From<bincode::Error> for CoreError {
    fn from(err: bincode::Error) -> Self {
        CoreError::Serialization(format!("bincode error: {err}"))
    }
}

impl<T> From<std::sync::PoisonError<T>> for CoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        CoreError::InvariantViolation("lock poisoned".to_string())
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        CoreError::Other(err.to_string())
    }
}

impl From<&str> for CoreError {
    fn from(msg: &str) -> Self {
        CoreError::Other(msg.to_string())
    }
}

impl From<String> for CoreError {
    fn from(msg: String) -> Self {
        CoreError::Other(msg)
    }
}

impl CoreError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CoreError::Config(msg.into())
    }

    pub fn protocol_local<S: Into<String>>(msg: S) -> Self {
        CoreError::ProtocolLocal(msg.into())
    }

    pub fn protocol_remote<S: Into<String>>(msg: S) -> Self {
        CoreError::ProtocolRemote(msg.into())
    }

    pub fn resource_transient<S: Into<String>>(msg: S) -> Self {
        CoreError::ResourceTransient(msg.into())
    }

    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        CoreError::InvariantViolation(msg.into())
    }

    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        CoreError::NotFound(resource.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        CoreError::InvalidInput(msg.into())
    }

    /// Fatal taxonomy per `spec.md` §7: configuration and invariant errors
    /// should terminate the owning executor rather than be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::Config(_) | CoreError::InvariantViolation(_)
        )
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::ResourceTransient(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, CoreError::ProtocolLocal(_) | CoreError::ProtocolRemote(_))
    }
}
