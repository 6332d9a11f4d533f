//! Container engine abstraction.
//!
//! The lifecycle controller and network manager talk to the engine through
//! the [`Engine`] trait. Two implementations exist:
//! - [`DockerEngine`] drives a Docker-compatible daemon through bollard
//! - [`MockEngine`] keeps everything in memory for tests
//!
//! Transport failures are classified into [`EngineError`] at this boundary so
//! that no raw client error escapes to callers.

mod docker;
mod mock;

pub use docker::DockerEngine;
pub use mock::MockEngine;

use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{ContainerInspectResponse, Network};
use std::collections::HashMap;
use thiserror::Error;

/// Engine errors, classified by what the caller can do about them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The daemon could not be reached (socket, TCP, request timeout).
    #[error("engine unreachable: {0}")]
    Unreachable(String),

    /// The addressed resource does not exist (HTTP 404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The request had no effect, e.g. starting a running container (HTTP 304).
    #[error("not modified")]
    NotModified,

    /// The request conflicts with current state (HTTP 409).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The daemon refused the request (HTTP 403).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Any other API failure.
    #[error("engine returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Message from the daemon.
        message: String,
    },

    /// Reading a response stream failed.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Options applied when pulling an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullOptions {
    /// Platform to pull, e.g. `linux/amd64`.
    pub platform: Option<String>,
    /// Registry credentials.
    pub credentials: Option<RegistryAuth>,
}

/// Registry credentials for image pulls.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RegistryAuth {
    /// Registry user.
    pub username: String,
    /// Registry password or token.
    pub password: String,
    /// Registry address, e.g. `ghcr.io`.
    pub server_address: Option<String>,
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("server_address", &self.server_address)
            .finish()
    }
}

/// Options for removing a container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Kill the container first if it is running.
    pub force: bool,
    /// Remove anonymous volumes attached to the container.
    pub volumes: bool,
}

/// A one-off command to run inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecRequest {
    /// Command and arguments.
    pub cmd: Vec<String>,
    /// Extra `KEY=VALUE` environment entries.
    pub env: Vec<String>,
    /// User to run as.
    pub user: Option<String>,
    /// Working directory inside the container.
    pub working_dir: Option<String>,
    /// Allocate a pseudo-TTY.
    pub tty: bool,
}

/// Result of executing a command inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i64,
}

impl ExecOutput {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Captured container output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogs {
    /// Everything written to stdout so far.
    pub stdout: String,
    /// Everything written to stderr so far.
    pub stderr: String,
}

/// Network creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkRequest {
    /// Network name.
    pub name: String,
    /// Driver, e.g. `bridge`.
    pub driver: String,
    /// Driver options.
    pub options: HashMap<String, String>,
    /// Labels.
    pub labels: HashMap<String, String>,
}

/// Operations the lifecycle controller needs from a container engine.
///
/// All methods are async and complete only when the daemon has answered.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Endpoint URL this engine talks to, e.g. `unix:///var/run/docker.sock`.
    fn endpoint(&self) -> &str;

    /// Check whether an image is present locally.
    async fn image_exists(&self, image: &str) -> Result<bool, EngineError>;

    /// Pull an image, consuming the progress stream to completion.
    async fn pull_image(&self, image: &str, options: &PullOptions) -> Result<(), EngineError>;

    /// Create a container and return its id.
    async fn create_container(
        &self,
        name: Option<&str>,
        config: Config<String>,
    ) -> Result<String, EngineError>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Stop a container, killing it after `timeout_secs`.
    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<(), EngineError>;

    /// Send a signal to a container.
    async fn kill_container(&self, id: &str, signal: &str) -> Result<(), EngineError>;

    /// Restart a container.
    async fn restart_container(&self, id: &str, timeout_secs: isize) -> Result<(), EngineError>;

    /// Remove a container.
    async fn remove_container(&self, id: &str, options: RemoveOptions) -> Result<(), EngineError>;

    /// Inspect a container.
    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, EngineError>;

    /// Collect everything the container has written so far.
    async fn logs(&self, id: &str) -> Result<ContainerLogs, EngineError>;

    /// Run a command inside a running container and wait for it to finish.
    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, EngineError>;

    /// Extract a tar archive into `dir` inside the container.
    async fn upload_archive(&self, id: &str, dir: &str, archive: Vec<u8>)
        -> Result<(), EngineError>;

    /// Fetch `path` from the container as a tar archive.
    async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, EngineError>;

    /// Create a network and return its id.
    async fn create_network(&self, request: &NetworkRequest) -> Result<String, EngineError>;

    /// Remove a network.
    async fn remove_network(&self, id: &str) -> Result<(), EngineError>;

    /// Inspect a network.
    async fn inspect_network(&self, id: &str) -> Result<Network, EngineError>;
}
