//! Declarative container specification.
//!
//! A [`ContainerSpec`] describes the container to create: image, command,
//! environment, ports, volumes, binds, labels, health check and the wait
//! strategy to run after start. Builder operations normalise heterogeneous
//! inputs into one canonical representation and reject malformed input with
//! [`Error::InvalidArgument`]. [`ContainerSpec::to_create_config`] produces the
//! engine creation payload.

use bollard::container::{Config, NetworkingConfig};
use bollard::models::{EndpointSettings, HealthConfig, HostConfig, PortBinding};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::engine::PullOptions;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::wait::WaitStrategy;

// ============================================================================
// Ports
// ============================================================================

/// Transport protocol of an exposed port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Protocol {
    /// TCP (the default).
    #[default]
    Tcp,
    /// UDP.
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

/// A container port with its protocol, displayed as `"<port>/<proto>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortSpec {
    /// Port number inside the container.
    pub port: u16,
    /// Protocol.
    pub protocol: Protocol,
}

impl PortSpec {
    /// A TCP port.
    pub fn tcp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Tcp,
        }
    }

    /// A UDP port.
    pub fn udp(port: u16) -> Self {
        Self {
            port,
            protocol: Protocol::Udp,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.protocol)
    }
}

impl FromStr for PortSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (port, protocol) = match s.trim().split_once('/') {
            Some((port, "tcp")) => (port, Protocol::Tcp),
            Some((port, "udp")) => (port, Protocol::Udp),
            Some((_, other)) => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported protocol {:?} in port {:?}",
                    other, s
                )))
            }
            None => (s.trim(), Protocol::Tcp),
        };

        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("invalid port: {:?}", s)))?;
        if port == 0 {
            return Err(Error::InvalidArgument("port 0 cannot be exposed".to_string()));
        }

        Ok(Self { port, protocol })
    }
}

/// Conversion into a normalised [`PortSpec`]. Bare numbers become TCP ports.
pub trait ToPortSpec {
    /// Normalise into a [`PortSpec`].
    fn to_port_spec(&self) -> Result<PortSpec>;
}

impl ToPortSpec for PortSpec {
    fn to_port_spec(&self) -> Result<PortSpec> {
        Ok(*self)
    }
}

impl ToPortSpec for u16 {
    fn to_port_spec(&self) -> Result<PortSpec> {
        if *self == 0 {
            return Err(Error::InvalidArgument("port 0 cannot be exposed".to_string()));
        }
        Ok(PortSpec::tcp(*self))
    }
}

impl ToPortSpec for &str {
    fn to_port_spec(&self) -> Result<PortSpec> {
        self.parse()
    }
}

impl ToPortSpec for String {
    fn to_port_spec(&self) -> Result<PortSpec> {
        self.parse()
    }
}

impl ToPortSpec for &String {
    fn to_port_spec(&self) -> Result<PortSpec> {
        self.parse()
    }
}

// ============================================================================
// Environment
// ============================================================================

/// Environment input in any of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvInput {
    /// One `"KEY=VALUE"` entry.
    Entry(String),
    /// A key and a value.
    Pair(String, String),
    /// Several keys and values, in order.
    Map(Vec<(String, String)>),
    /// Several `"KEY=VALUE"` entries.
    List(Vec<String>),
}

impl From<&str> for EnvInput {
    fn from(entry: &str) -> Self {
        EnvInput::Entry(entry.to_string())
    }
}

impl From<String> for EnvInput {
    fn from(entry: String) -> Self {
        EnvInput::Entry(entry)
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for EnvInput {
    fn from((key, value): (K, V)) -> Self {
        EnvInput::Pair(key.into(), value.into())
    }
}

impl From<Vec<String>> for EnvInput {
    fn from(entries: Vec<String>) -> Self {
        EnvInput::List(entries)
    }
}

impl From<Vec<&str>> for EnvInput {
    fn from(entries: Vec<&str>) -> Self {
        EnvInput::List(entries.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for EnvInput {
    fn from(entries: [&str; N]) -> Self {
        EnvInput::List(entries.iter().map(|e| e.to_string()).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for EnvInput {
    fn from(map: BTreeMap<K, V>) -> Self {
        EnvInput::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for EnvInput {
    fn from(map: HashMap<K, V>) -> Self {
        EnvInput::Map(map.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl EnvInput {
    /// Normalise into `"KEY=VALUE"` entries, validating each one.
    fn into_entries(self) -> Result<Vec<String>> {
        let entries = match self {
            EnvInput::Entry(entry) => vec![entry],
            EnvInput::List(entries) => entries,
            EnvInput::Pair(key, value) => vec![format!("{}={}", key, value)],
            EnvInput::Map(pairs) => pairs
                .into_iter()
                .map(|(key, value)| format!("{}={}", key, value))
                .collect(),
        };

        for entry in &entries {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "environment entry {:?} is not KEY=VALUE",
                        entry
                    )))
                }
            }
        }

        Ok(entries)
    }
}

// ============================================================================
// Filesystem binds
// ============================================================================

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindMode {
    /// Read-write (the default).
    #[default]
    ReadWrite,
    /// Read-only.
    ReadOnly,
}

impl fmt::Display for BindMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindMode::ReadWrite => write!(f, "rw"),
            BindMode::ReadOnly => write!(f, "ro"),
        }
    }
}

impl FromStr for BindMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rw" => Ok(BindMode::ReadWrite),
            "ro" => Ok(BindMode::ReadOnly),
            other => Err(Error::InvalidArgument(format!(
                "bind mode must be ro or rw, got {:?}",
                other
            ))),
        }
    }
}

/// A host path mounted into the container, displayed as `host:container:mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    /// Path on the host.
    pub host: String,
    /// Path inside the container.
    pub container: String,
    /// Access mode.
    pub mode: BindMode,
}

impl fmt::Display for Bind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.host, self.container, self.mode)
    }
}

impl FromStr for Bind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(':').collect();
        match parts.as_slice() {
            [host, container] => Bind::new(host, container, BindMode::ReadWrite),
            [host, container, mode] => Bind::new(host, container, mode.parse()?),
            _ => Err(Error::InvalidArgument(format!(
                "bind {:?} is not host:container[:mode]",
                s
            ))),
        }
    }
}

impl Bind {
    /// Build a bind, rejecting empty paths.
    pub fn new(host: &str, container: &str, mode: BindMode) -> Result<Self> {
        if host.is_empty() || container.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "bind needs both a host and a container path, got {:?} and {:?}",
                host, container
            )));
        }
        Ok(Self {
            host: host.to_string(),
            container: container.to_string(),
            mode,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum RawBind {
    Spec(String),
    Parts {
        host: String,
        container: String,
        mode: Option<String>,
    },
}

/// Filesystem bind input in any of the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindsInput(Vec<RawBind>);

impl From<&str> for BindsInput {
    fn from(spec: &str) -> Self {
        BindsInput(vec![RawBind::Spec(spec.to_string())])
    }
}

impl From<String> for BindsInput {
    fn from(spec: String) -> Self {
        BindsInput(vec![RawBind::Spec(spec)])
    }
}

impl From<Vec<&str>> for BindsInput {
    fn from(specs: Vec<&str>) -> Self {
        BindsInput(specs.into_iter().map(|s| RawBind::Spec(s.to_string())).collect())
    }
}

impl From<Vec<String>> for BindsInput {
    fn from(specs: Vec<String>) -> Self {
        BindsInput(specs.into_iter().map(RawBind::Spec).collect())
    }
}

impl<A: Into<String>, B: Into<String>> From<(A, B)> for BindsInput {
    fn from((host, container): (A, B)) -> Self {
        BindsInput(vec![RawBind::Parts {
            host: host.into(),
            container: container.into(),
            mode: None,
        }])
    }
}

impl<A: Into<String>, B: Into<String>, C: Into<String>> From<(A, B, C)> for BindsInput {
    fn from((host, container, mode): (A, B, C)) -> Self {
        BindsInput(vec![RawBind::Parts {
            host: host.into(),
            container: container.into(),
            mode: Some(mode.into()),
        }])
    }
}

impl<K: Into<String>, V: Into<String>> From<BTreeMap<K, V>> for BindsInput {
    fn from(map: BTreeMap<K, V>) -> Self {
        BindsInput(
            map.into_iter()
                .map(|(host, container)| RawBind::Parts {
                    host: host.into(),
                    container: container.into(),
                    mode: None,
                })
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>> From<HashMap<K, V>> for BindsInput {
    fn from(map: HashMap<K, V>) -> Self {
        BindsInput(
            map.into_iter()
                .map(|(host, container)| RawBind::Parts {
                    host: host.into(),
                    container: container.into(),
                    mode: None,
                })
                .collect(),
        )
    }
}

impl BindsInput {
    fn into_binds(self) -> Result<Vec<Bind>> {
        self.0
            .into_iter()
            .map(|raw| match raw {
                RawBind::Spec(spec) => spec.parse(),
                RawBind::Parts {
                    host,
                    container,
                    mode,
                } => {
                    let mode = match mode {
                        Some(mode) => mode.parse()?,
                        None => BindMode::ReadWrite,
                    };
                    Bind::new(&host, &container, mode)
                }
            })
            .collect()
    }
}

// ============================================================================
// Health check
// ============================================================================

/// Health check input. Durations are seconds.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HealthCheckOptions {
    /// Command and arguments.
    pub test: Vec<String>,
    /// Seconds between checks (default 30).
    #[serde(default)]
    pub interval: Option<f64>,
    /// Seconds before a check is considered hung (default 30).
    #[serde(default)]
    pub timeout: Option<f64>,
    /// Consecutive failures before unhealthy (default 3).
    #[serde(default)]
    pub retries: Option<i64>,
    /// Run the command through the container's shell.
    #[serde(default)]
    pub shell: bool,
}

impl HealthCheckOptions {
    /// Health check running `test` directly.
    pub fn new<I, S>(test: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test: test.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Set the interval in seconds.
    pub fn interval(mut self, seconds: f64) -> Self {
        self.interval = Some(seconds);
        self
    }

    /// Set the timeout in seconds.
    pub fn timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Set the retry count.
    pub fn retries(mut self, retries: i64) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Run through the shell (`CMD-SHELL`).
    pub fn shell(mut self) -> Self {
        self.shell = true;
        self
    }
}

/// Normalised health check, in the engine's units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Command prefixed with `CMD` or `CMD-SHELL`.
    pub test: Vec<String>,
    /// Interval in nanoseconds.
    pub interval_ns: i64,
    /// Timeout in nanoseconds.
    pub timeout_ns: i64,
    /// Retries.
    pub retries: i64,
}

const DEFAULT_HEALTHCHECK_SECS: f64 = 30.0;
const DEFAULT_HEALTHCHECK_RETRIES: i64 = 3;

fn seconds_to_nanos(seconds: f64) -> Result<i64> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(Error::InvalidArgument(format!(
            "health check duration must be non-negative, got {}",
            seconds
        )));
    }
    Ok((seconds * 1_000_000_000.0) as i64)
}

impl TryFrom<HealthCheckOptions> for HealthCheck {
    type Error = Error;

    fn try_from(options: HealthCheckOptions) -> Result<Self> {
        if options.test.is_empty() {
            return Err(Error::InvalidArgument(
                "health check needs a command".to_string(),
            ));
        }

        let test = match options.test.first().map(String::as_str) {
            Some("CMD") | Some("CMD-SHELL") => options.test,
            _ if options.shell => vec!["CMD-SHELL".to_string(), options.test.join(" ")],
            _ => std::iter::once("CMD".to_string())
                .chain(options.test)
                .collect(),
        };

        Ok(Self {
            test,
            interval_ns: seconds_to_nanos(options.interval.unwrap_or(DEFAULT_HEALTHCHECK_SECS))?,
            timeout_ns: seconds_to_nanos(options.timeout.unwrap_or(DEFAULT_HEALTHCHECK_SECS))?,
            retries: options.retries.unwrap_or(DEFAULT_HEALTHCHECK_RETRIES),
        })
    }
}

// ============================================================================
// ContainerSpec
// ============================================================================

/// Declarative description of a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    image: String,
    name: Option<String>,
    command: Option<Vec<String>>,
    entrypoint: Option<Vec<String>>,
    exposed_ports: Vec<PortSpec>,
    port_bindings: BTreeMap<PortSpec, String>,
    volumes: BTreeSet<String>,
    filesystem_binds: Vec<Bind>,
    env: Vec<String>,
    labels: BTreeMap<String, String>,
    working_dir: Option<String>,
    healthcheck: Option<HealthCheck>,
    wait_strategy: Option<WaitStrategy>,
    pull_options: PullOptions,
    network: Option<String>,
    network_aliases: Vec<String>,
}

impl ContainerSpec {
    /// Spec for `image` with nothing else configured.
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Image reference.
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Container name, if set.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Command override.
    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    /// Entrypoint override.
    pub fn entrypoint(&self) -> Option<&[String]> {
        self.entrypoint.as_deref()
    }

    /// Exposed ports in the order they were added.
    pub fn exposed_ports(&self) -> &[PortSpec] {
        &self.exposed_ports
    }

    /// Host port per container port. An empty string means engine-assigned.
    pub fn port_bindings(&self) -> &BTreeMap<PortSpec, String> {
        &self.port_bindings
    }

    /// Container paths declared as volumes.
    pub fn volumes(&self) -> &BTreeSet<String> {
        &self.volumes
    }

    /// Filesystem binds in the order they were added.
    pub fn filesystem_binds(&self) -> &[Bind] {
        &self.filesystem_binds
    }

    /// Environment entries as `KEY=VALUE`, in insertion order.
    pub fn env(&self) -> &[String] {
        &self.env
    }

    /// Labels.
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Working directory.
    pub fn working_dir(&self) -> Option<&str> {
        self.working_dir.as_deref()
    }

    /// Health check.
    pub fn healthcheck(&self) -> Option<&HealthCheck> {
        self.healthcheck.as_ref()
    }

    /// Wait strategy run after start.
    pub fn wait_strategy(&self) -> Option<&WaitStrategy> {
        self.wait_strategy.as_ref()
    }

    /// Image pull options.
    pub fn pull_options(&self) -> &PullOptions {
        &self.pull_options
    }

    /// Network the container joins.
    pub fn network(&self) -> Option<&str> {
        self.network.as_deref()
    }

    /// Aliases on the joined network.
    pub fn network_aliases(&self) -> &[String] {
        &self.network_aliases
    }

    /// Value of an environment variable. The last entry for a key wins.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .filter_map(|entry| entry.split_once('='))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Append environment entries. Returns the updated environment.
    pub fn add_env(&mut self, input: impl Into<EnvInput>) -> Result<&[String]> {
        let entries = input.into().into_entries()?;
        self.env.extend(entries);
        Ok(&self.env)
    }

    /// Expose a port with an engine-assigned host port.
    ///
    /// An existing fixed binding for the same port is kept.
    pub fn add_exposed_port(&mut self, port: impl ToPortSpec) -> Result<&[PortSpec]> {
        let port = port.to_port_spec()?;
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self.port_bindings.entry(port).or_default();
        Ok(&self.exposed_ports)
    }

    /// Expose several ports.
    pub fn add_exposed_ports<I, P>(&mut self, ports: I) -> Result<&[PortSpec]>
    where
        I: IntoIterator<Item = P>,
        P: ToPortSpec,
    {
        for port in ports {
            self.add_exposed_port(port)?;
        }
        Ok(&self.exposed_ports)
    }

    /// Expose a port bound to a fixed host port. Returns the updated bindings.
    pub fn add_fixed_exposed_port(
        &mut self,
        container_port: impl ToPortSpec,
        host_port: u16,
    ) -> Result<&BTreeMap<PortSpec, String>> {
        let port = container_port.to_port_spec()?;
        if !self.exposed_ports.contains(&port) {
            self.exposed_ports.push(port);
        }
        self.port_bindings.insert(port, host_port.to_string());
        Ok(&self.port_bindings)
    }

    /// Expose several ports bound to fixed host ports.
    pub fn add_fixed_exposed_ports<I, P>(&mut self, mappings: I) -> Result<&BTreeMap<PortSpec, String>>
    where
        I: IntoIterator<Item = (P, u16)>,
        P: ToPortSpec,
    {
        for (container_port, host_port) in mappings {
            self.add_fixed_exposed_port(container_port, host_port)?;
        }
        Ok(&self.port_bindings)
    }

    /// Declare a container path as a volume.
    pub fn add_volume(&mut self, path: impl Into<String>) -> &BTreeSet<String> {
        self.volumes.insert(path.into());
        &self.volumes
    }

    /// Declare several volumes.
    pub fn add_volumes<I, S>(&mut self, paths: I) -> &BTreeSet<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volumes.extend(paths.into_iter().map(Into::into));
        &self.volumes
    }

    /// Add filesystem binds. Each container path is also declared as a volume.
    pub fn add_filesystem_bind(&mut self, input: impl Into<BindsInput>) -> Result<&[Bind]> {
        let binds = input.into().into_binds()?;
        for bind in binds {
            self.volumes.insert(bind.container.clone());
            self.filesystem_binds.push(bind);
        }
        Ok(&self.filesystem_binds)
    }

    /// Set a label.
    pub fn add_label(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> &BTreeMap<String, String> {
        self.labels.insert(key.into(), value.into());
        &self.labels
    }

    /// Set several labels.
    pub fn add_labels<I, K, V>(&mut self, labels: I) -> &BTreeMap<String, String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.labels
            .extend(labels.into_iter().map(|(k, v)| (k.into(), v.into())));
        &self.labels
    }

    /// Declare a health check.
    pub fn add_healthcheck(&mut self, options: HealthCheckOptions) -> Result<&HealthCheck> {
        Ok(self.healthcheck.insert(HealthCheck::try_from(options)?))
    }

    /// Use `strategy` after start.
    pub fn add_wait_for(&mut self, strategy: WaitStrategy) -> &WaitStrategy {
        self.wait_strategy.insert(strategy)
    }

    /// Wait for the first exposed port to accept TCP connections.
    ///
    /// Fails with [`Error::InvalidArgument`] if no port is exposed.
    pub fn add_default_wait_for(&mut self) -> Result<&WaitStrategy> {
        let port = self.exposed_ports.first().copied().ok_or_else(|| {
            Error::InvalidArgument(
                "a default wait strategy needs at least one exposed port".to_string(),
            )
        })?;
        Ok(self.wait_strategy.insert(WaitStrategy::tcp_port(port)?))
    }

    /// Use a built-in strategy by name (`logs`, `tcp_port`, `http`, `healthcheck`).
    pub fn add_wait_for_named(&mut self, name: &str, args: &Value) -> Result<&WaitStrategy> {
        Ok(self.wait_strategy.insert(WaitStrategy::named(name, args)?))
    }

    /// Whether a wait strategy has been configured.
    pub fn has_wait_strategy(&self) -> bool {
        self.wait_strategy.is_some()
    }

    /// Set the container name.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Set the command.
    pub fn set_command<I, S>(&mut self, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.command = Some(parts.into_iter().map(Into::into).collect());
    }

    /// Set the entrypoint.
    pub fn set_entrypoint<I, S>(&mut self, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entrypoint = Some(parts.into_iter().map(Into::into).collect());
    }

    /// Set the working directory.
    pub fn set_working_dir(&mut self, dir: impl Into<String>) {
        self.working_dir = Some(dir.into());
    }

    /// Set image pull options.
    pub fn set_pull_options(&mut self, options: PullOptions) {
        self.pull_options = options;
    }

    /// Join the named network.
    pub fn set_network(&mut self, network: impl Into<String>) {
        self.network = Some(network.into());
    }

    /// Add an alias on the joined network.
    pub fn add_network_alias(&mut self, alias: impl Into<String>) -> &[String] {
        let alias = alias.into();
        if !self.network_aliases.contains(&alias) {
            self.network_aliases.push(alias);
        }
        &self.network_aliases
    }

    // ------------------------------------------------------------------
    // Fluent forms
    // ------------------------------------------------------------------

    /// Fluent [`add_env`](Self::add_env).
    pub fn with_env(mut self, input: impl Into<EnvInput>) -> Result<Self> {
        self.add_env(input)?;
        Ok(self)
    }

    /// Fluent [`add_exposed_port`](Self::add_exposed_port).
    pub fn with_exposed_port(mut self, port: impl ToPortSpec) -> Result<Self> {
        self.add_exposed_port(port)?;
        Ok(self)
    }

    /// Fluent [`add_exposed_ports`](Self::add_exposed_ports).
    pub fn with_exposed_ports<I, P>(mut self, ports: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: ToPortSpec,
    {
        self.add_exposed_ports(ports)?;
        Ok(self)
    }

    /// Fluent [`add_fixed_exposed_port`](Self::add_fixed_exposed_port).
    pub fn with_fixed_exposed_port(
        mut self,
        container_port: impl ToPortSpec,
        host_port: u16,
    ) -> Result<Self> {
        self.add_fixed_exposed_port(container_port, host_port)?;
        Ok(self)
    }

    /// Fluent [`add_volume`](Self::add_volume).
    pub fn with_volume(mut self, path: impl Into<String>) -> Self {
        self.add_volume(path);
        self
    }

    /// Fluent [`add_filesystem_bind`](Self::add_filesystem_bind).
    pub fn with_filesystem_bind(mut self, input: impl Into<BindsInput>) -> Result<Self> {
        self.add_filesystem_bind(input)?;
        Ok(self)
    }

    /// Fluent [`add_label`](Self::add_label).
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_label(key, value);
        self
    }

    /// Fluent [`add_labels`](Self::add_labels).
    pub fn with_labels<I, K, V>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.add_labels(labels);
        self
    }

    /// Fluent [`add_healthcheck`](Self::add_healthcheck).
    pub fn with_healthcheck(mut self, options: HealthCheckOptions) -> Result<Self> {
        self.add_healthcheck(options)?;
        Ok(self)
    }

    /// Fluent [`add_wait_for`](Self::add_wait_for).
    pub fn with_wait_for(mut self, strategy: WaitStrategy) -> Self {
        self.add_wait_for(strategy);
        self
    }

    /// Fluent [`add_default_wait_for`](Self::add_default_wait_for).
    pub fn with_default_wait_for(mut self) -> Result<Self> {
        self.add_default_wait_for()?;
        Ok(self)
    }

    /// Fluent [`set_name`](Self::set_name).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.set_name(name);
        self
    }

    /// Fluent [`set_command`](Self::set_command).
    pub fn with_command<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_command(parts);
        self
    }

    /// Fluent [`set_entrypoint`](Self::set_entrypoint).
    pub fn with_entrypoint<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_entrypoint(parts);
        self
    }

    /// Fluent [`set_working_dir`](Self::set_working_dir).
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.set_working_dir(dir);
        self
    }

    /// Fluent [`set_pull_options`](Self::set_pull_options).
    pub fn with_pull_options(mut self, options: PullOptions) -> Self {
        self.set_pull_options(options);
        self
    }

    /// Join `network`.
    pub fn with_network(mut self, network: &Network) -> Self {
        self.set_network(network.name());
        self
    }

    /// Add aliases on the joined network.
    pub fn with_network_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for alias in aliases {
            self.add_network_alias(alias);
        }
        self
    }

    /// Fluent [`apply_options`](Self::apply_options).
    pub fn with_options(mut self, options: &Value) -> Result<Self> {
        self.apply_options(options)?;
        Ok(self)
    }

    // ------------------------------------------------------------------
    // Generic options
    // ------------------------------------------------------------------

    /// Apply a JSON object of options, each key naming a builder operation.
    ///
    /// Recognised keys: `name`, `command`, `entrypoint`, `env`, `working_dir`,
    /// `exposed_ports`, `fixed_exposed_port` (alias `port_binding`),
    /// `fixed_exposed_ports`, `volumes`, `filesystem_binds`, `labels`, `label`,
    /// `healthcheck`, `wait_for`, `network_aliases`, `platform`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] naming the first unknown key or malformed value.
    pub fn apply_options(&mut self, options: &Value) -> Result<()> {
        let options = options.as_object().ok_or_else(|| {
            Error::InvalidArgument("options must be a JSON object".to_string())
        })?;

        for (key, value) in options {
            match key.as_str() {
                "name" => self.set_name(expect_str(key, value)?),
                "command" => self.set_command(string_list(key, value)?),
                "entrypoint" => self.set_entrypoint(string_list(key, value)?),
                "env" => {
                    self.add_env(env_input(key, value)?)?;
                }
                "working_dir" => self.set_working_dir(expect_str(key, value)?),
                "exposed_ports" => {
                    let ports = match value {
                        Value::Array(items) => items.clone(),
                        single => vec![single.clone()],
                    };
                    for port in &ports {
                        self.add_exposed_port(port_from_value(key, port)?)?;
                    }
                }
                "fixed_exposed_port" | "port_binding" => match value {
                    Value::Array(pair) if pair.len() == 2 => {
                        self.add_fixed_exposed_port(
                            port_from_value(key, &pair[0])?,
                            host_port_from_value(key, &pair[1])?,
                        )?;
                    }
                    Value::Object(map) if map.len() == 1 => {
                        self.apply_fixed_ports(key, map)?;
                    }
                    _ => return Err(invalid_option(key, "expected [container, host] or {container: host}")),
                },
                "fixed_exposed_ports" => {
                    let map = value
                        .as_object()
                        .ok_or_else(|| invalid_option(key, "expected an object"))?;
                    self.apply_fixed_ports(key, map)?;
                }
                "volumes" => match value {
                    Value::Object(map) => {
                        self.add_volumes(map.keys().cloned());
                    }
                    other => {
                        self.add_volumes(string_list(key, other)?);
                    }
                },
                "filesystem_binds" => {
                    let input: BindsInput = match value {
                        Value::String(spec) => spec.clone().into(),
                        Value::Array(_) => string_list(key, value)?.into(),
                        Value::Object(map) => map
                            .iter()
                            .map(|(host, container)| {
                                Ok((host.clone(), expect_str(key, container)?.to_string()))
                            })
                            .collect::<Result<BTreeMap<String, String>>>()?
                            .into(),
                        _ => return Err(invalid_option(key, "expected a string, list or object")),
                    };
                    self.add_filesystem_bind(input)?;
                }
                "labels" => {
                    let map = value
                        .as_object()
                        .ok_or_else(|| invalid_option(key, "expected an object"))?;
                    for (label, label_value) in map {
                        self.add_label(label.clone(), scalar_to_string(key, label_value)?);
                    }
                }
                "label" => match value {
                    Value::Array(pair) if pair.len() == 2 => {
                        self.add_label(
                            expect_str(key, &pair[0])?.to_string(),
                            scalar_to_string(key, &pair[1])?,
                        );
                    }
                    _ => return Err(invalid_option(key, "expected [key, value]")),
                },
                "healthcheck" => {
                    let options: HealthCheckOptions = serde_json::from_value(value.clone())
                        .map_err(|e| invalid_option(key, &e.to_string()))?;
                    self.add_healthcheck(options)?;
                }
                "wait_for" => match value {
                    Value::Null => {
                        self.add_default_wait_for()?;
                    }
                    Value::String(name) => {
                        self.add_wait_for_named(name, &Value::Null)?;
                    }
                    Value::Array(items) => {
                        let (name, args) = items
                            .split_first()
                            .ok_or_else(|| invalid_option(key, "expected [name, args...]"))?;
                        let name = expect_str(key, name)?;
                        self.add_wait_for_named(name, &Value::Array(args.to_vec()))?;
                    }
                    _ => return Err(invalid_option(key, "expected null, a name or [name, args...]")),
                },
                "network_aliases" => {
                    for alias in string_list(key, value)? {
                        self.add_network_alias(alias);
                    }
                }
                "platform" => {
                    self.pull_options.platform = Some(expect_str(key, value)?.to_string());
                }
                unknown => {
                    return Err(Error::InvalidArgument(format!(
                        "unknown option: {}",
                        unknown
                    )))
                }
            }
        }

        Ok(())
    }

    fn apply_fixed_ports(&mut self, key: &str, map: &serde_json::Map<String, Value>) -> Result<()> {
        for (container_port, host_port) in map {
            self.add_fixed_exposed_port(container_port, host_port_from_value(key, host_port)?)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Engine payload
    // ------------------------------------------------------------------

    /// Build the engine creation payload.
    pub fn to_create_config(&self) -> Config<String> {
        let exposed_ports = (!self.exposed_ports.is_empty()).then(|| {
            self.exposed_ports
                .iter()
                .map(|port| (port.to_string(), HashMap::new()))
                .collect()
        });

        let port_bindings = (!self.port_bindings.is_empty()).then(|| {
            self.port_bindings
                .iter()
                .map(|(port, host_port)| {
                    (
                        port.to_string(),
                        Some(vec![PortBinding {
                            host_ip: None,
                            host_port: Some(host_port.clone()),
                        }]),
                    )
                })
                .collect()
        });

        let volumes = (!self.volumes.is_empty()).then(|| {
            self.volumes
                .iter()
                .map(|path| (path.clone(), HashMap::new()))
                .collect()
        });

        let binds = (!self.filesystem_binds.is_empty())
            .then(|| self.filesystem_binds.iter().map(Bind::to_string).collect());

        let healthcheck = self.healthcheck.as_ref().map(|hc| HealthConfig {
            test: Some(hc.test.clone()),
            interval: Some(hc.interval_ns),
            timeout: Some(hc.timeout_ns),
            retries: Some(hc.retries),
            ..Default::default()
        });

        let networking_config = self.network.as_ref().map(|network| NetworkingConfig {
            endpoints_config: HashMap::from([(
                network.clone(),
                EndpointSettings {
                    aliases: (!self.network_aliases.is_empty())
                        .then(|| self.network_aliases.clone()),
                    ..Default::default()
                },
            )]),
        });

        Config {
            image: Some(self.image.clone()),
            cmd: self.command.clone(),
            entrypoint: self.entrypoint.clone(),
            env: (!self.env.is_empty()).then(|| self.env.clone()),
            labels: (!self.labels.is_empty())
                .then(|| self.labels.clone().into_iter().collect()),
            working_dir: self.working_dir.clone(),
            exposed_ports,
            volumes,
            healthcheck,
            host_config: Some(HostConfig {
                port_bindings,
                binds,
                network_mode: self.network.clone(),
                ..Default::default()
            }),
            networking_config,
            ..Default::default()
        }
    }
}

fn invalid_option(key: &str, reason: &str) -> Error {
    Error::InvalidArgument(format!("option {}: {}", key, reason))
}

fn expect_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| invalid_option(key, "expected a string"))
}

fn scalar_to_string(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(invalid_option(key, "expected a string, number or boolean")),
    }
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>> {
    match value {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| expect_str(key, item).map(str::to_string))
            .collect(),
        _ => Err(invalid_option(key, "expected a string or a list of strings")),
    }
}

fn env_input(key: &str, value: &Value) -> Result<EnvInput> {
    match value {
        Value::String(entry) => Ok(EnvInput::Entry(entry.clone())),
        Value::Array(_) => Ok(EnvInput::List(string_list(key, value)?)),
        Value::Object(map) => Ok(EnvInput::Map(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), scalar_to_string(key, v)?)))
                .collect::<Result<_>>()?,
        )),
        _ => Err(invalid_option(key, "expected a string, list or object")),
    }
}

fn port_from_value(key: &str, value: &Value) -> Result<PortSpec> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| invalid_option(key, "port out of range"))?
            .to_port_spec(),
        Value::String(s) => s.to_port_spec(),
        _ => Err(invalid_option(key, "expected a port number or \"port/proto\"")),
    }
}

fn host_port_from_value(key: &str, value: &Value) -> Result<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
    .ok_or_else(|| invalid_option(key, "expected a host port number"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ===========================================
    // Ports
    // ===========================================

    #[test]
    fn bare_port_normalizes_to_tcp() {
        let mut spec = ContainerSpec::new("redis");
        spec.add_exposed_port(6379).unwrap();
        spec.add_exposed_port("53/udp").unwrap();

        let ports: Vec<String> = spec.exposed_ports().iter().map(|p| p.to_string()).collect();
        assert_eq!(ports, vec!["6379/tcp", "53/udp"]);
    }

    #[test]
    fn normalizing_canonical_port_is_noop() {
        let canonical: PortSpec = "6379/tcp".parse().unwrap();
        let again: PortSpec = canonical.to_string().parse().unwrap();
        assert_eq!(canonical, again);

        let mut spec = ContainerSpec::new("redis");
        spec.add_exposed_port(6379).unwrap();
        spec.add_exposed_port("6379/tcp").unwrap();
        assert_eq!(spec.exposed_ports().len(), 1);
    }

    #[test]
    fn invalid_ports_are_rejected() {
        assert!(matches!(
            "http".parse::<PortSpec>(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            "80/sctp".parse::<PortSpec>(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(0u16.to_port_spec(), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn fixed_binding_survives_dynamic_expose() {
        let mut spec = ContainerSpec::new("redis");
        spec.add_fixed_exposed_port(6379, 16379).unwrap();
        spec.add_exposed_port(6379).unwrap();
        spec.add_exposed_port("6379/tcp").unwrap();

        assert_eq!(spec.port_bindings()[&PortSpec::tcp(6379)], "16379");
        assert_eq!(spec.exposed_ports(), &[PortSpec::tcp(6379)]);
    }

    #[test]
    fn dynamic_expose_binds_empty_host_port() {
        let mut spec = ContainerSpec::new("redis");
        spec.add_exposed_port(6379).unwrap();
        assert_eq!(spec.port_bindings()[&PortSpec::tcp(6379)], "");
    }

    // ===========================================
    // Environment
    // ===========================================

    #[test]
    fn env_keeps_insertion_order_across_shapes() {
        let mut spec = ContainerSpec::new("alpine");
        spec.add_env(BTreeMap::from([("a", "b")])).unwrap();
        spec.add_env("c=d").unwrap();
        spec.add_env(vec!["e=f"]).unwrap();

        assert_eq!(spec.env(), &["a=b", "c=d", "e=f"]);
    }

    #[test]
    fn env_pair_is_joined() {
        let mut spec = ContainerSpec::new("alpine");
        spec.add_env(("KEY", "value=with=equals")).unwrap();
        assert_eq!(spec.get_env("KEY"), Some("value=with=equals"));
    }

    #[test]
    fn env_without_separator_is_rejected() {
        let mut spec = ContainerSpec::new("alpine");
        assert!(matches!(
            spec.add_env("NOVALUE"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            spec.add_env(vec!["A=1", "broken"]),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(spec.add_env("=x"), Err(Error::InvalidArgument(_))));
        assert!(spec.env().is_empty());
    }

    #[test]
    fn get_env_prefers_latest_entry() {
        let spec = ContainerSpec::new("alpine")
            .with_env("A=1")
            .unwrap()
            .with_env("A=2")
            .unwrap();
        assert_eq!(spec.get_env("A"), Some("2"));
        assert_eq!(spec.get_env("B"), None);
    }

    // ===========================================
    // Binds and volumes
    // ===========================================

    #[test]
    fn binds_normalize_and_register_volumes() {
        let mut spec = ContainerSpec::new("alpine");
        spec.add_filesystem_bind(("/host", "/container", "ro")).unwrap();
        spec.add_filesystem_bind(BTreeMap::from([("/h2", "/c2")]))
            .unwrap();

        let binds: Vec<String> = spec.filesystem_binds().iter().map(Bind::to_string).collect();
        assert_eq!(binds, vec!["/host:/container:ro", "/h2:/c2:rw"]);
        assert!(spec.volumes().contains("/container"));
        assert!(spec.volumes().contains("/c2"));
    }

    #[test]
    fn bind_strings_default_to_read_write() {
        let mut spec = ContainerSpec::new("alpine");
        spec.add_filesystem_bind(vec!["/a:/b", "/c:/d:ro"]).unwrap();

        let binds: Vec<String> = spec.filesystem_binds().iter().map(Bind::to_string).collect();
        assert_eq!(binds, vec!["/a:/b:rw", "/c:/d:ro"]);
    }

    #[test]
    fn malformed_binds_are_rejected() {
        let mut spec = ContainerSpec::new("alpine");
        assert!(spec.add_filesystem_bind("/only-host").is_err());
        assert!(spec.add_filesystem_bind("/a:/b:rx").is_err());
        assert!(spec.add_filesystem_bind(("", "/b")).is_err());
    }

    // ===========================================
    // Health check
    // ===========================================

    #[test]
    fn healthcheck_defaults_and_units() {
        let mut spec = ContainerSpec::new("nginx");
        let hc = spec
            .add_healthcheck(HealthCheckOptions::new(["curl", "-f", "http://localhost"]))
            .unwrap();

        assert_eq!(hc.test, vec!["CMD", "curl", "-f", "http://localhost"]);
        assert_eq!(hc.interval_ns, 30_000_000_000);
        assert_eq!(hc.timeout_ns, 30_000_000_000);
        assert_eq!(hc.retries, 3);
    }

    #[test]
    fn healthcheck_shell_mode_and_fractions() {
        let hc = HealthCheck::try_from(
            HealthCheckOptions::new(["pg_isready", "-U", "test"])
                .shell()
                .interval(0.5)
                .timeout(2.0)
                .retries(5),
        )
        .unwrap();

        assert_eq!(hc.test, vec!["CMD-SHELL", "pg_isready -U test"]);
        assert_eq!(hc.interval_ns, 500_000_000);
        assert_eq!(hc.timeout_ns, 2_000_000_000);
        assert_eq!(hc.retries, 5);
    }

    #[test]
    fn empty_healthcheck_is_rejected() {
        let err = HealthCheck::try_from(HealthCheckOptions::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    // ===========================================
    // Wait strategy normalization
    // ===========================================

    #[test]
    fn default_wait_uses_first_exposed_port() {
        let mut spec = ContainerSpec::new("redis");
        spec.add_exposed_ports([6379u16, 16379]).unwrap();
        let strategy = spec.add_default_wait_for().unwrap();
        assert!(matches!(
            strategy,
            WaitStrategy::TcpPort { port, .. } if *port == PortSpec::tcp(6379)
        ));
    }

    #[test]
    fn default_wait_without_ports_is_rejected() {
        let mut spec = ContainerSpec::new("redis");
        assert!(matches!(
            spec.add_default_wait_for(),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_named_wait_is_rejected() {
        let mut spec = ContainerSpec::new("redis");
        assert!(matches!(
            spec.add_wait_for_named("telepathy", &Value::Null),
            Err(Error::InvalidArgument(_))
        ));
    }

    // ===========================================
    // Generic options
    // ===========================================

    #[test]
    fn options_dispatch_to_builders() {
        let spec = ContainerSpec::new("alpine")
            .with_options(&json!({
                "name": "worker",
                "command": ["sh", "-c", "echo hi"],
                "env": {"A": "1", "B": 2},
                "exposed_ports": [8080, "53/udp"],
                "fixed_exposed_port": {"9000": 19000},
                "volumes": ["/data"],
                "filesystem_binds": "/tmp:/mnt:ro",
                "labels": {"team": "core"},
                "working_dir": "/srv",
                "healthcheck": {"test": ["true"], "interval": 1},
                "wait_for": ["logs", "ready"]
            }))
            .unwrap();

        assert_eq!(spec.name(), Some("worker"));
        assert_eq!(spec.command().unwrap(), &["sh", "-c", "echo hi"]);
        assert_eq!(spec.get_env("B"), Some("2"));
        assert_eq!(spec.port_bindings()[&PortSpec::tcp(9000)], "19000");
        assert!(spec.exposed_ports().contains(&PortSpec::udp(53)));
        assert!(spec.volumes().contains("/mnt"));
        assert_eq!(spec.labels()["team"], "core");
        assert_eq!(spec.working_dir(), Some("/srv"));
        assert_eq!(spec.healthcheck().unwrap().interval_ns, 1_000_000_000);
        assert!(matches!(spec.wait_strategy(), Some(WaitStrategy::Logs { .. })));
    }

    #[test]
    fn unknown_option_names_the_key() {
        let err = ContainerSpec::new("alpine")
            .with_options(&json!({"colour": "blue"}))
            .unwrap_err();
        match err {
            Error::InvalidArgument(message) => assert!(message.contains("colour")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn oversized_wait_timeout_option_is_rejected() {
        let result = ContainerSpec::new("alpine")
            .with_options(&json!({"wait_for": ["logs", "ready", {"timeout": 1e30}]}));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    // ===========================================
    // Engine payload
    // ===========================================

    #[test]
    fn create_config_carries_normalized_fields() {
        let spec = ContainerSpec::new("redis:7")
            .with_exposed_port(6379)
            .unwrap()
            .with_fixed_exposed_port(8001, 18001)
            .unwrap()
            .with_env(("REDIS_PASSWORD", "secret"))
            .unwrap()
            .with_filesystem_bind(("/host", "/data"))
            .unwrap()
            .with_label("purpose", "test")
            .with_command(["redis-server", "--appendonly", "yes"]);

        let config = spec.to_create_config();
        assert_eq!(config.image.as_deref(), Some("redis:7"));
        assert_eq!(
            config.env,
            Some(vec!["REDIS_PASSWORD=secret".to_string()])
        );
        assert!(config.exposed_ports.as_ref().unwrap().contains_key("6379/tcp"));
        assert!(config.volumes.as_ref().unwrap().contains_key("/data"));

        let host = config.host_config.unwrap();
        let bindings = host.port_bindings.unwrap();
        assert_eq!(
            bindings["6379/tcp"].as_ref().unwrap()[0].host_port.as_deref(),
            Some("")
        );
        assert_eq!(
            bindings["8001/tcp"].as_ref().unwrap()[0].host_port.as_deref(),
            Some("18001")
        );
        assert_eq!(host.binds, Some(vec!["/host:/data:rw".to_string()]));
    }

    #[test]
    fn create_config_joins_network_with_aliases() {
        let mut spec = ContainerSpec::new("alpine");
        spec.set_network("berth-network-test");
        spec.add_network_alias("db");
        spec.add_network_alias("db");

        let config = spec.to_create_config();
        assert_eq!(
            config.host_config.unwrap().network_mode.as_deref(),
            Some("berth-network-test")
        );
        let endpoints = config.networking_config.unwrap().endpoints_config;
        assert_eq!(
            endpoints["berth-network-test"].aliases,
            Some(vec!["db".to_string()])
        );
    }
}
