//! Error types for berth-core.

use crate::engine::EngineError;

/// Main error type for container and network operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The container engine could not be reached.
    #[error("cannot reach container engine: {0}")]
    Connection(String),

    /// The operation needs a created container and there is none.
    #[error("container has not been started")]
    ContainerNotStarted,

    /// The declared image could not be resolved or pulled.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The container does not declare a health check.
    #[error("container does not declare a health check")]
    HealthcheckNotSupported,

    /// The requested port was never exposed or bound.
    #[error("port {0} is not mapped")]
    PortNotMapped(String),

    /// A wait strategy deadline elapsed.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Malformed builder input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The handle is in a state that forbids the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A network with the same name already exists.
    #[error("network already exists: {0}")]
    NetworkAlreadyExists(String),

    /// The network still has containers attached.
    #[error("network in use: {0}")]
    NetworkInUse(String),

    /// Copying a file into or out of a container failed.
    #[error("file transfer failed: {0}")]
    Transfer(String),

    /// An HTTP readiness probe failed for a reason other than "not ready".
    #[error("http probe failed: {0}")]
    Http(String),

    /// Local I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other engine failure.
    #[error("engine error: {0}")]
    Engine(#[source] EngineError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Unreachable(message) => Error::Connection(message),
            other => Error::Engine(other),
        }
    }
}

/// Result type alias for berth-core operations.
pub type Result<T> = std::result::Result<T, Error>;
