//! Container lifecycle controller.
//!
//! A [`DockerContainer`] owns one engine-side container created from a
//! [`ContainerSpec`]. Lifecycle stages advance strictly in the order
//!
//! ```text
//! Unbound -> Created -> Running -> Stopped -> Removed
//!                          ^           |
//!                          +-- start --+   (restart also returns to Running)
//! ```
//!
//! The stage is cached on the handle so that "not started" errors need no
//! engine round trip. Live status (`running`, `exited`, ...) is always
//! re-derived from an inspect call.
//!
//! A failed `start` (including a wait-strategy timeout) does not remove the
//! container: cleanup is the caller's responsibility, e.g. through
//! [`DockerContainer::remove`] or [`DockerContainer::scoped`].

use bollard::models::{ContainerInspectResponse, ContainerStateStatusEnum, HealthStatusEnum};
use futures_util::future::BoxFuture;
use regex::Regex;
use std::fmt;
use std::io::Read;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;

use crate::config::{Settings, DOCKERENV_PATH};
use crate::engine::{ContainerLogs, Engine, EngineError, ExecOutput, ExecRequest, RemoveOptions};
use crate::error::{Error, Result};
use crate::spec::{ContainerSpec, PortSpec, ToPortSpec};
use crate::wait::{self, HttpWait, WaitOptions, WaitStrategy};

/// Seconds the engine waits before killing a container on a graceful stop.
const STOP_TIMEOUT_SECS: i64 = 10;

/// Signal sent by [`DockerContainer::kill`] callers that have no preference.
pub const DEFAULT_KILL_SIGNAL: &str = "SIGKILL";

/// Lifecycle stage cached on the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// No engine-side container exists yet.
    Unbound,
    /// Created but not started.
    Created,
    /// Started.
    Running,
    /// Stopped or killed; can be started again.
    Stopped,
    /// Removed from the engine.
    Removed,
}

/// Live container status as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    /// Created, never started.
    Created,
    /// Running.
    Running,
    /// Paused.
    Paused,
    /// Restarting.
    Restarting,
    /// Being removed.
    Removing,
    /// Exited.
    Exited,
    /// Dead.
    Dead,
    /// Any status this library does not know.
    Unknown,
}

impl From<Option<ContainerStateStatusEnum>> for ContainerStatus {
    fn from(status: Option<ContainerStateStatusEnum>) -> Self {
        match status {
            Some(ContainerStateStatusEnum::CREATED) => ContainerStatus::Created,
            Some(ContainerStateStatusEnum::RUNNING) => ContainerStatus::Running,
            Some(ContainerStateStatusEnum::PAUSED) => ContainerStatus::Paused,
            Some(ContainerStateStatusEnum::RESTARTING) => ContainerStatus::Restarting,
            Some(ContainerStateStatusEnum::REMOVING) => ContainerStatus::Removing,
            Some(ContainerStateStatusEnum::EXITED) => ContainerStatus::Exited,
            Some(ContainerStateStatusEnum::DEAD) => ContainerStatus::Dead,
            _ => ContainerStatus::Unknown,
        }
    }
}

// ============================================================================
// Host environment
// ============================================================================

/// Facts about the calling process used to work out where a container is
/// reachable from.
///
/// The nested-container rules are a best-effort heuristic assuming the
/// caller shares a bridge network with the daemon. `host_override` always wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    /// Externally reachable host, used verbatim (`TC_HOST`).
    pub host_override: Option<String>,
    /// Whether `DOCKER_HOST` is set.
    pub docker_host_set: bool,
    /// Whether the caller itself runs inside a container.
    pub inside_container: bool,
    /// Default gateway of the caller's network namespace.
    pub default_gateway: Option<String>,
}

impl HostEnvironment {
    /// Capture the environment of the current process.
    pub fn detect() -> Self {
        let settings = Settings::load();
        let inside_container = Path::new(DOCKERENV_PATH).exists();
        let default_gateway = if inside_container {
            std::fs::read_to_string("/proc/net/route")
                .ok()
                .and_then(|table| parse_default_gateway(&table))
                .map(|ip| ip.to_string())
        } else {
            None
        };

        Self {
            host_override: settings.host_override,
            docker_host_set: settings.docker_host.is_some(),
            inside_container,
            default_gateway,
        }
    }

    /// Host of the daemon as seen from the caller, derived from the engine endpoint.
    pub fn daemon_host(&self, endpoint: &str) -> String {
        if let Some(host) = &self.host_override {
            return host.clone();
        }

        let Ok(url) = reqwest::Url::parse(endpoint) else {
            return "localhost".to_string();
        };
        match url.scheme() {
            "http" | "https" | "tcp" => url
                .host_str()
                .map(str::to_string)
                .unwrap_or_else(|| "localhost".to_string()),
            "unix" | "npipe" if self.inside_container => self
                .default_gateway
                .clone()
                .unwrap_or_else(|| "localhost".to_string()),
            _ => "localhost".to_string(),
        }
    }

    /// Whether the caller shares the target's bridge gateway with the daemon,
    /// in which case container ports are reachable without remapping.
    pub fn uses_container_ports(&self, endpoint: &str, bridge_gateway: Option<&str>) -> bool {
        self.host_override.is_none()
            && self.inside_container
            && bridge_gateway == Some(self.daemon_host(endpoint).as_str())
    }

    fn needs_bridge_lookup(&self) -> bool {
        self.host_override.is_none() && self.inside_container
    }

    /// Resolve the externally reachable host of a container.
    pub fn resolve_host(
        &self,
        endpoint: &str,
        bridge_ip: Option<&str>,
        bridge_gateway: Option<&str>,
    ) -> String {
        let host = self.daemon_host(endpoint);
        if self.host_override.is_some() || !self.inside_container || self.docker_host_set {
            return host;
        }

        match bridge_gateway {
            Some(gateway) if gateway == host => bridge_ip.unwrap_or(gateway).to_string(),
            Some(gateway) => gateway.to_string(),
            None => host,
        }
    }
}

/// Parse the default route's gateway out of `/proc/net/route`.
pub fn parse_default_gateway(route_table: &str) -> Option<Ipv4Addr> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [_, "00000000", gateway, ..] => u32::from_str_radix(gateway, 16)
                .ok()
                .map(|raw| Ipv4Addr::from(raw.to_le_bytes())),
            _ => None,
        }
    })
}

fn bridge_addresses(info: &ContainerInspectResponse) -> (Option<String>, Option<String>) {
    let bridge = info
        .network_settings
        .as_ref()
        .and_then(|ns| ns.networks.as_ref())
        .and_then(|networks| networks.get("bridge"));
    (
        bridge.and_then(|b| b.ip_address.clone()).filter(|ip| !ip.is_empty()),
        bridge.and_then(|b| b.gateway.clone()).filter(|gw| !gw.is_empty()),
    )
}

// ============================================================================
// DockerContainer
// ============================================================================

/// Handle on one engine-side container.
pub struct DockerContainer {
    engine: Arc<dyn Engine>,
    spec: ContainerSpec,
    environment: HostEnvironment,
    state: LifecycleState,
    id: Option<String>,
    name: Option<String>,
    created_at: Option<String>,
}

impl fmt::Debug for DockerContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerContainer")
            .field("image", &self.spec.image())
            .field("state", &self.state)
            .field("id", &self.id)
            .field("name", &self.name)
            .field("endpoint", &self.engine.endpoint())
            .finish()
    }
}

impl DockerContainer {
    /// Handle for `spec` on the process-wide engine connection.
    pub fn new(spec: ContainerSpec) -> Result<Self> {
        Ok(Self::with_engine(spec, crate::connection::connection()?))
    }

    /// Handle for `spec` on an explicit engine.
    pub fn with_engine(spec: ContainerSpec, engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            spec,
            environment: HostEnvironment::detect(),
            state: LifecycleState::Unbound,
            id: None,
            name: None,
            created_at: None,
        }
    }

    /// Replace the detected host environment.
    pub fn with_environment(mut self, environment: HostEnvironment) -> Self {
        self.environment = environment;
        self
    }

    /// The spec driving this container.
    pub fn spec(&self) -> &ContainerSpec {
        &self.spec
    }

    /// Mutable access to the spec, only before the container is created.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] once an engine-side container exists.
    pub fn spec_mut(&mut self) -> Result<&mut ContainerSpec> {
        if self.state != LifecycleState::Unbound {
            return Err(Error::InvalidState(format!(
                "spec of {} cannot change after creation",
                self.spec.image()
            )));
        }
        Ok(&mut self.spec)
    }

    /// Engine this handle talks to.
    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// Cached lifecycle stage.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Engine id, once created.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Container name as reported by the engine, once started.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Creation timestamp as reported by the engine (RFC 3339).
    pub fn created_at(&self) -> Option<&str> {
        self.created_at.as_deref()
    }

    /// Image reference.
    pub fn image(&self) -> &str {
        self.spec.image()
    }

    fn require_id(&self) -> Result<&str> {
        match (self.state, self.id.as_deref()) {
            (LifecycleState::Unbound | LifecycleState::Removed, _) | (_, None) => {
                Err(Error::ContainerNotStarted)
            }
            (_, Some(id)) => Ok(id),
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Create (if needed) and start the container, then run its wait strategy.
    ///
    /// Starting a running handle is a no-op. A stopped handle is started again
    /// and its wait strategy re-run.
    ///
    /// # Errors
    ///
    /// - [`Error::ImageNotFound`] if the image cannot be pulled
    /// - [`Error::Connection`] if the engine is unreachable
    /// - [`Error::InvalidState`] if the handle was removed
    /// - whatever the wait strategy fails with; the container keeps running
    pub async fn start(&mut self) -> Result<&mut Self> {
        match self.state {
            LifecycleState::Running => return Ok(self),
            LifecycleState::Removed => {
                return Err(Error::InvalidState(
                    "container was removed; build a new handle".to_string(),
                ))
            }
            LifecycleState::Unbound => self.create().await?,
            LifecycleState::Created | LifecycleState::Stopped => {}
        }

        let id = self.require_id()?.to_string();
        match self.engine.start_container(&id).await {
            Ok(()) | Err(EngineError::NotModified) => {}
            Err(e) => return Err(e.into()),
        }
        self.state = LifecycleState::Running;

        let info = self.engine.inspect_container(&id).await?;
        self.name = info.name.map(|name| name.trim_start_matches('/').to_string());
        self.created_at = info.created;
        tracing::info!("Started container {} ({})", id, self.spec.image());

        if let Some(strategy) = self.spec.wait_strategy().cloned() {
            self.wait_for(&strategy).await?;
        }

        Ok(self)
    }

    async fn create(&mut self) -> Result<()> {
        let image = self.spec.image().to_string();

        if !self.engine.image_exists(&image).await? {
            match self.engine.pull_image(&image, self.spec.pull_options()).await {
                Ok(()) => {}
                Err(EngineError::NotFound(message)) => {
                    tracing::warn!("Image {} not found: {}", image, message);
                    return Err(Error::ImageNotFound(image));
                }
                Err(e) => return Err(e.into()),
            }
        }

        let id = match self
            .engine
            .create_container(self.spec.name(), self.spec.to_create_config())
            .await
        {
            Ok(id) => id,
            Err(EngineError::NotFound(_)) => return Err(Error::ImageNotFound(image)),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Created container {} from {}", id, image);
        self.id = Some(id);
        self.state = LifecycleState::Created;
        Ok(())
    }

    /// Stop gracefully, killing after the engine's grace period.
    pub async fn stop(&mut self) -> Result<()> {
        self.stop_with(false).await
    }

    /// Stop immediately.
    pub async fn stop_force(&mut self) -> Result<()> {
        self.stop_with(true).await
    }

    /// Stop; `force` skips the grace period.
    ///
    /// # Errors
    ///
    /// [`Error::ContainerNotStarted`] if the handle was never created.
    pub async fn stop_with(&mut self, force: bool) -> Result<()> {
        let id = self.require_id()?.to_string();
        let timeout = if force { 0 } else { STOP_TIMEOUT_SECS };

        match self.engine.stop_container(&id, timeout).await {
            Ok(()) | Err(EngineError::NotModified) => {}
            Err(e) => return Err(e.into()),
        }

        tracing::info!("Stopped container {}", id);
        self.state = LifecycleState::Stopped;
        Ok(())
    }

    /// Send `signal` (e.g. [`DEFAULT_KILL_SIGNAL`]) to the container.
    pub async fn kill(&mut self, signal: &str) -> Result<()> {
        let id = self.require_id()?.to_string();
        self.engine.kill_container(&id, signal).await?;

        tracing::info!("Sent {} to container {}", signal, id);
        self.state = LifecycleState::Stopped;
        Ok(())
    }

    /// Restart the container.
    pub async fn restart(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        self.engine
            .restart_container(&id, STOP_TIMEOUT_SECS as isize)
            .await?;

        tracing::info!("Restarted container {}", id);
        self.state = LifecycleState::Running;
        Ok(())
    }

    /// Remove the container. Safe to call repeatedly.
    pub async fn remove(&mut self) -> Result<()> {
        self.remove_with(RemoveOptions::default()).await
    }

    /// Remove the container with explicit options.
    pub async fn remove_with(&mut self, options: RemoveOptions) -> Result<()> {
        let Some(id) = self.id.clone() else {
            return Ok(());
        };

        match self.engine.remove_container(&id, options).await {
            Ok(()) => tracing::info!("Removed container {}", id),
            Err(EngineError::NotFound(_)) => {
                tracing::debug!("Container {} already gone", id);
            }
            Err(e) => return Err(e.into()),
        }

        self.id = None;
        self.state = LifecycleState::Removed;
        Ok(())
    }

    /// Start, run `f`, and always stop afterwards.
    ///
    /// The first error wins: a failure inside `f` is reported even if the
    /// following stop fails too.
    pub async fn scoped<F, T>(&mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut DockerContainer) -> BoxFuture<'a, Result<T>>,
    {
        let outcome = match self.start().await {
            Ok(container) => f(container).await,
            Err(e) => Err(e),
        };

        let stopped = if self.id.is_some() {
            self.stop().await
        } else {
            Ok(())
        };

        match (outcome, stopped) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Whether the engine still knows this container.
    pub async fn exists(&self) -> Result<bool> {
        let Some(id) = self.id.as_deref() else {
            return Ok(false);
        };
        match self.engine.inspect_container(id).await {
            Ok(_) => Ok(true),
            Err(EngineError::NotFound(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Full inspect document.
    pub async fn info(&self) -> Result<ContainerInspectResponse> {
        let id = self.require_id()?;
        Ok(self.engine.inspect_container(id).await?)
    }

    /// Live status.
    pub async fn status(&self) -> Result<ContainerStatus> {
        let info = self.info().await?;
        Ok(info.state.and_then(|s| s.status).into())
    }

    /// Whether the container is running. A never-started handle is not running.
    pub async fn running(&self) -> Result<bool> {
        match self.status().await {
            Ok(status) => Ok(status == ContainerStatus::Running),
            Err(Error::ContainerNotStarted) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the container has exited.
    pub async fn exited(&self) -> Result<bool> {
        Ok(self.status().await? == ContainerStatus::Exited)
    }

    /// Whether the container is dead.
    pub async fn dead(&self) -> Result<bool> {
        Ok(self.status().await? == ContainerStatus::Dead)
    }

    /// Whether the container is paused.
    pub async fn paused(&self) -> Result<bool> {
        Ok(self.status().await? == ContainerStatus::Paused)
    }

    /// Whether the container is restarting.
    pub async fn restarting(&self) -> Result<bool> {
        Ok(self.status().await? == ContainerStatus::Restarting)
    }

    /// Whether the container declares a health check.
    pub async fn supports_healthcheck(&self) -> Result<bool> {
        let info = self.info().await?;
        Ok(info
            .config
            .and_then(|config| config.healthcheck)
            .and_then(|hc| hc.test)
            .is_some_and(|test| test.first().map(String::as_str) != Some("NONE")))
    }

    /// Whether the health check reports healthy. A never-started handle is not healthy.
    ///
    /// # Errors
    ///
    /// [`Error::HealthcheckNotSupported`] if no health check is declared.
    pub async fn healthy(&self) -> Result<bool> {
        let info = match self.info().await {
            Ok(info) => info,
            Err(Error::ContainerNotStarted) => return Ok(false),
            Err(e) => return Err(e),
        };

        let declared = info
            .config
            .as_ref()
            .and_then(|config| config.healthcheck.as_ref())
            .and_then(|hc| hc.test.as_ref())
            .is_some_and(|test| test.first().map(String::as_str) != Some("NONE"));
        if !declared {
            return Err(Error::HealthcheckNotSupported);
        }

        Ok(info
            .state
            .and_then(|state| state.health)
            .and_then(|health| health.status)
            == Some(HealthStatusEnum::HEALTHY))
    }

    /// Externally reachable host of the container.
    pub async fn host(&self) -> Result<String> {
        if let Some(host) = &self.environment.host_override {
            return Ok(host.clone());
        }
        self.require_id()?;

        let (bridge_ip, bridge_gateway) = if self.environment.needs_bridge_lookup() {
            bridge_addresses(&self.info().await?)
        } else {
            (None, None)
        };

        Ok(self.environment.resolve_host(
            self.engine.endpoint(),
            bridge_ip.as_deref(),
            bridge_gateway.as_deref(),
        ))
    }

    /// Host port mapped to `port`.
    ///
    /// When the caller runs inside a container sharing the target's bridge
    /// gateway, the container port itself is returned.
    ///
    /// # Errors
    ///
    /// [`Error::PortNotMapped`] if the port has no host binding.
    pub async fn mapped_port(&self, port: impl ToPortSpec) -> Result<u16> {
        let port = port.to_port_spec()?;
        let info = self.info().await?;

        let mapped = info
            .network_settings
            .as_ref()
            .and_then(|ns| ns.ports.as_ref())
            .and_then(|ports| ports.get(&port.to_string()))
            .and_then(|bindings| bindings.as_ref())
            .and_then(|bindings| bindings.first())
            .and_then(|binding| binding.host_port.as_deref())
            .and_then(|host_port| host_port.parse::<u16>().ok())
            .ok_or_else(|| Error::PortNotMapped(port.to_string()))?;

        let (_, bridge_gateway) = bridge_addresses(&info);
        if self
            .environment
            .uses_container_ports(self.engine.endpoint(), bridge_gateway.as_deref())
        {
            return Ok(port.port);
        }

        Ok(mapped)
    }

    /// Host port mapped to the first exposed port.
    pub async fn first_mapped_port(&self) -> Result<u16> {
        let port: PortSpec = self
            .spec
            .exposed_ports()
            .first()
            .copied()
            .ok_or_else(|| Error::PortNotMapped("no exposed ports".to_string()))?;
        self.mapped_port(port).await
    }

    /// Everything the container has written so far.
    pub async fn logs(&self) -> Result<ContainerLogs> {
        let id = self.require_id()?;
        Ok(self.engine.logs(id).await?)
    }

    /// Run `cmd` inside the container and capture its output.
    pub async fn exec<I, S>(&self, cmd: I) -> Result<ExecOutput>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exec_with(ExecRequest {
            cmd: cmd.into_iter().map(Into::into).collect(),
            ..Default::default()
        })
        .await
    }

    /// Run a command with explicit exec options.
    pub async fn exec_with(&self, request: ExecRequest) -> Result<ExecOutput> {
        let id = self.require_id()?;
        if request.cmd.is_empty() {
            return Err(Error::InvalidArgument("exec needs a command".to_string()));
        }
        tracing::debug!("Executing {:?} in container {}", request.cmd, id);
        Ok(self.engine.exec(id, &request).await?)
    }

    // ------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------

    /// Run a wait strategy against this container.
    pub async fn wait_for(&self, strategy: &WaitStrategy) -> Result<()> {
        match strategy {
            WaitStrategy::Logs { pattern, options } => self.wait_for_logs(pattern, *options).await,
            WaitStrategy::TcpPort { port, options } => self.wait_for_tcp_port(*port, *options).await,
            WaitStrategy::Http { http, options } => self.wait_for_http(http, *options).await,
            WaitStrategy::Healthcheck { options } => self.wait_for_healthcheck(*options).await,
            WaitStrategy::Custom { predicate, options } => {
                self.require_id()?;
                wait::poll_until(&strategy.describe(), *options, || predicate(self)).await
            }
        }
    }

    /// Wait until stdout or stderr matches `pattern`.
    pub async fn wait_for_logs(&self, pattern: &Regex, options: WaitOptions) -> Result<()> {
        let id = self.require_id()?;
        let description = format!("logs to match {}", pattern.as_str());

        wait::poll_until(&description, options, || async move {
            let logs = self.engine.logs(id).await?;
            Ok::<_, Error>(pattern.is_match(&logs.stdout) || pattern.is_match(&logs.stderr))
        })
        .await
    }

    /// Wait until `port` accepts TCP connections.
    ///
    /// Fails fast with [`Error::PortNotMapped`] if the port has no binding.
    pub async fn wait_for_tcp_port(&self, port: impl ToPortSpec, options: WaitOptions) -> Result<()> {
        let port = port.to_port_spec()?;
        let mapped = self.mapped_port(port).await?;
        let host = self.host().await?;
        let description = format!("port {} to open", port);

        wait::poll_until(&description, options, || wait::tcp_probe(&host, mapped)).await
    }

    /// Wait until an HTTP endpoint answers with the expected status.
    pub async fn wait_for_http(&self, http: &HttpWait, options: WaitOptions) -> Result<()> {
        let mapped = self.mapped_port(http.container_port).await?;
        let host = self.host().await?;
        let url = http.url(&host, mapped);
        let client = wait::http_client(http.https)?;
        let description = format!("HTTP status {} on {}", http.status, http.path);

        wait::poll_until(&description, options, || {
            wait::http_probe(&client, &url, http.status)
        })
        .await
    }

    /// Wait until the health check reports healthy.
    pub async fn wait_for_healthcheck(&self, options: WaitOptions) -> Result<()> {
        self.require_id()?;
        if !self.supports_healthcheck().await? {
            return Err(Error::HealthcheckNotSupported);
        }

        wait::poll_until("health check to be healthy", options, || self.healthy()).await
    }

    // ------------------------------------------------------------------
    // File transfer
    // ------------------------------------------------------------------

    async fn require_running(&self) -> Result<&str> {
        if !self.running().await? {
            return Err(Error::ContainerNotStarted);
        }
        self.require_id()
    }

    /// Write `content` to `container_path` inside the running container.
    pub async fn copy_file_to_container(
        &self,
        container_path: &str,
        content: impl AsRef<[u8]>,
    ) -> Result<()> {
        let id = self.require_running().await?;
        let (dir, file_name) = split_container_path(container_path)?;

        let archive = single_file_archive(file_name, content.as_ref())
            .map_err(|e| Error::Transfer(format!("archiving {}: {}", container_path, e)))?;
        self.engine
            .upload_archive(id, dir, archive)
            .await
            .map_err(|e| Error::Transfer(format!("copying to {}: {}", container_path, e)))?;

        tracing::debug!("Copied {} bytes to {}:{}", content.as_ref().len(), id, container_path);
        Ok(())
    }

    /// Copy a host file to `container_path` inside the running container.
    pub async fn copy_path_to_container(
        &self,
        host_path: impl AsRef<Path>,
        container_path: &str,
    ) -> Result<()> {
        let host_path = host_path.as_ref();
        let content = tokio::fs::read(host_path)
            .await
            .map_err(|e| Error::Transfer(format!("reading {}: {}", host_path.display(), e)))?;
        self.copy_file_to_container(container_path, content).await
    }

    /// Read `container_path` from the running container.
    pub async fn copy_file_from_container(&self, container_path: &str) -> Result<Vec<u8>> {
        let id = self.require_running().await?;

        let archive = self
            .engine
            .download_archive(id, container_path)
            .await
            .map_err(|e| Error::Transfer(format!("copying from {}: {}", container_path, e)))?;

        first_file_in_archive(&archive)
            .map_err(|e| Error::Transfer(format!("unpacking {}: {}", container_path, e)))?
            .ok_or_else(|| Error::Transfer(format!("{} is not a regular file", container_path)))
    }

    /// Copy `container_path` from the running container to a host file.
    pub async fn copy_file_from_container_to(
        &self,
        container_path: &str,
        host_path: impl AsRef<Path>,
    ) -> Result<()> {
        let content = self.copy_file_from_container(container_path).await?;
        let host_path = host_path.as_ref();
        tokio::fs::write(host_path, content)
            .await
            .map_err(|e| Error::Transfer(format!("writing {}: {}", host_path.display(), e)))
    }
}

fn split_container_path(path: &str) -> Result<(&str, &str)> {
    let (dir, file_name) = path.rsplit_once('/').ok_or_else(|| {
        Error::InvalidArgument(format!("container path must be absolute: {}", path))
    })?;
    if file_name.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "container path must name a file: {}",
            path
        )));
    }
    Ok((if dir.is_empty() { "/" } else { dir }, file_name))
}

fn single_file_archive(file_name: &str, content: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, file_name, content)?;
    builder.into_inner()
}

fn first_file_in_archive(archive: &[u8]) -> std::io::Result<Option<Vec<u8>>> {
    let mut archive = tar::Archive::new(archive);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_file() {
            let mut content = Vec::new();
            entry.read_to_end(&mut content)?;
            return Ok(Some(content));
        }
    }
    Ok(None)
}
