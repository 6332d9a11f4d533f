//! Wait strategies: bounded polling until a container is ready.
//!
//! Every strategy shares one contract, implemented by [`poll_until`]:
//! - probe, then pause for `interval`, until the probe reports ready
//! - each probe is bounded by the overall deadline; an in-flight probe is
//!   dropped (closing its connection or stream) when the deadline passes
//! - on deadline, fail with [`Error::Timeout`] naming what was awaited
//! - "not ready yet" conditions are swallowed by the probes, anything else
//!   propagates immediately
//!
//! The lifecycle controller maps each [`WaitStrategy`] variant to its probe.

use futures_util::future::BoxFuture;
use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::container::DockerContainer;
use crate::error::{Error, Result};
use crate::spec::{PortSpec, ToPortSpec};

/// Default overall deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default pause between probes.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// Upper bound on a single TCP connect or HTTP request.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline offset used when the requested timeout overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Deadline and polling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Overall deadline.
    pub timeout: Duration,
    /// Pause between probes.
    pub interval: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl WaitOptions {
    /// Options with an explicit timeout and interval.
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    /// Replace the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// HTTP readiness probe parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpWait {
    /// Request path, starting with `/`.
    pub path: String,
    /// Container port serving HTTP.
    pub container_port: u16,
    /// Use TLS (certificates are not verified).
    pub https: bool,
    /// Expected status code.
    pub status: u16,
}

impl Default for HttpWait {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            container_port: 80,
            https: false,
            status: 200,
        }
    }
}

impl HttpWait {
    /// Probe `path` on `container_port`.
    pub fn new(path: impl Into<String>, container_port: u16) -> Self {
        Self {
            path: path.into(),
            container_port,
            ..Default::default()
        }
    }

    /// Expect `status` instead of 200.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Use TLS.
    pub fn with_https(mut self) -> Self {
        self.https = true;
        self
    }

    /// URL of the probe for the given host and mapped port.
    pub fn url(&self, host: &str, port: u16) -> String {
        let scheme = if self.https { "https" } else { "http" };
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("{}://{}:{}{}", scheme, host, port, path)
    }
}

/// Caller-supplied readiness predicate, polled until it returns `true`.
pub type CustomPredicate =
    Arc<dyn for<'a> Fn(&'a DockerContainer) -> BoxFuture<'a, Result<bool>> + Send + Sync>;

/// How to decide that a started container is ready.
#[derive(Clone)]
pub enum WaitStrategy {
    /// Combined stdout and stderr match a pattern.
    Logs {
        /// Pattern to search for.
        pattern: Regex,
        /// Deadline and interval.
        options: WaitOptions,
    },
    /// A mapped port accepts TCP connections.
    TcpPort {
        /// Container port.
        port: PortSpec,
        /// Deadline and interval.
        options: WaitOptions,
    },
    /// An HTTP endpoint answers with the expected status.
    Http {
        /// Probe parameters.
        http: HttpWait,
        /// Deadline and interval.
        options: WaitOptions,
    },
    /// The container's own health check reports healthy.
    Healthcheck {
        /// Deadline and interval.
        options: WaitOptions,
    },
    /// A caller-supplied predicate returns `true`.
    Custom {
        /// The predicate.
        predicate: CustomPredicate,
        /// Deadline and interval.
        options: WaitOptions,
    },
}

impl fmt::Debug for WaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitStrategy::Logs { pattern, options } => f
                .debug_struct("Logs")
                .field("pattern", &pattern.as_str())
                .field("options", options)
                .finish(),
            WaitStrategy::TcpPort { port, options } => f
                .debug_struct("TcpPort")
                .field("port", port)
                .field("options", options)
                .finish(),
            WaitStrategy::Http { http, options } => f
                .debug_struct("Http")
                .field("http", http)
                .field("options", options)
                .finish(),
            WaitStrategy::Healthcheck { options } => f
                .debug_struct("Healthcheck")
                .field("options", options)
                .finish(),
            WaitStrategy::Custom { options, .. } => f
                .debug_struct("Custom")
                .field("options", options)
                .finish_non_exhaustive(),
        }
    }
}

impl WaitStrategy {
    /// Wait for logs to match `pattern` (regex syntax, `(?i)` for case-insensitive).
    pub fn logs(pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| Error::InvalidArgument(format!("invalid log pattern: {}", e)))?;
        Ok(Self::logs_regex(pattern))
    }

    /// Wait for logs to match a compiled pattern.
    pub fn logs_regex(pattern: Regex) -> Self {
        WaitStrategy::Logs {
            pattern,
            options: WaitOptions::default(),
        }
    }

    /// Wait for `port` to accept TCP connections.
    pub fn tcp_port(port: impl ToPortSpec) -> Result<Self> {
        Ok(WaitStrategy::TcpPort {
            port: port.to_port_spec()?,
            options: WaitOptions::default(),
        })
    }

    /// Wait for an HTTP endpoint.
    pub fn http(http: HttpWait) -> Self {
        WaitStrategy::Http {
            http,
            options: WaitOptions::default(),
        }
    }

    /// Wait for the container's health check.
    pub fn healthcheck() -> Self {
        WaitStrategy::Healthcheck {
            options: WaitOptions::default(),
        }
    }

    /// Wait until `predicate` returns `true`.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: for<'a> Fn(&'a DockerContainer) -> BoxFuture<'a, Result<bool>> + Send + Sync + 'static,
    {
        WaitStrategy::Custom {
            predicate: Arc::new(predicate),
            options: WaitOptions::default(),
        }
    }

    /// Deadline and interval of this strategy.
    pub fn options(&self) -> WaitOptions {
        match self {
            WaitStrategy::Logs { options, .. }
            | WaitStrategy::TcpPort { options, .. }
            | WaitStrategy::Http { options, .. }
            | WaitStrategy::Healthcheck { options }
            | WaitStrategy::Custom { options, .. } => *options,
        }
    }

    fn options_mut(&mut self) -> &mut WaitOptions {
        match self {
            WaitStrategy::Logs { options, .. }
            | WaitStrategy::TcpPort { options, .. }
            | WaitStrategy::Http { options, .. }
            | WaitStrategy::Healthcheck { options }
            | WaitStrategy::Custom { options, .. } => options,
        }
    }

    /// Replace the deadline and interval.
    pub fn with_options(mut self, options: WaitOptions) -> Self {
        *self.options_mut() = options;
        self
    }

    /// Replace the deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.options_mut().timeout = timeout;
        self
    }

    /// Replace the interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.options_mut().interval = interval;
        self
    }

    /// What is being waited for, used in timeout errors and logs.
    pub fn describe(&self) -> String {
        match self {
            WaitStrategy::Logs { pattern, .. } => format!("logs to match {}", pattern.as_str()),
            WaitStrategy::TcpPort { port, .. } => format!("port {} to open", port),
            WaitStrategy::Http { http, .. } => {
                format!("HTTP status {} on {}", http.status, http.path)
            }
            WaitStrategy::Healthcheck { .. } => "health check to be healthy".to_string(),
            WaitStrategy::Custom { .. } => "custom readiness predicate".to_string(),
        }
    }

    /// Resolve a built-in strategy by name.
    ///
    /// `args` is `null`, an object of keyword arguments, or an array of
    /// positional arguments optionally ending in an object of keyword
    /// arguments. Durations are seconds.
    ///
    /// | name | positional | keywords |
    /// |---|---|---|
    /// | `logs` | pattern | `timeout`, `interval` |
    /// | `tcp_port` | port | `timeout`, `interval` |
    /// | `http` | | `path`, `container_port`, `https`, `status`, `timeout`, `interval` |
    /// | `healthcheck` | | `timeout`, `interval` |
    pub fn named(name: &str, args: &Value) -> Result<Self> {
        let (positional, keywords) = split_args(args)?;

        let strategy = match name {
            "logs" => {
                let pattern = positional
                    .first()
                    .or_else(|| keywords.get("pattern"))
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        Error::InvalidArgument("logs wait needs a pattern".to_string())
                    })?;
                WaitStrategy::logs(pattern)?
            }
            "tcp_port" => {
                let port = positional
                    .first()
                    .or_else(|| keywords.get("port"))
                    .ok_or_else(|| {
                        Error::InvalidArgument("tcp_port wait needs a port".to_string())
                    })?;
                WaitStrategy::tcp_port(port_arg(port)?)?
            }
            "http" => {
                let mut http = HttpWait::default();
                if let Some(path) = keywords.get("path") {
                    http.path = path
                        .as_str()
                        .ok_or_else(|| Error::InvalidArgument("http path must be a string".into()))?
                        .to_string();
                }
                if let Some(port) = keywords.get("container_port") {
                    http.container_port = port_arg(port)?.port;
                }
                if let Some(https) = keywords.get("https") {
                    http.https = https.as_bool().ok_or_else(|| {
                        Error::InvalidArgument("http https flag must be a boolean".into())
                    })?;
                }
                if let Some(status) = keywords.get("status") {
                    http.status = status
                        .as_u64()
                        .and_then(|s| u16::try_from(s).ok())
                        .ok_or_else(|| {
                            Error::InvalidArgument("http status must be a number".into())
                        })?;
                }
                WaitStrategy::http(http)
            }
            "healthcheck" => WaitStrategy::healthcheck(),
            unknown => {
                return Err(Error::InvalidArgument(format!(
                    "unknown wait strategy: {}",
                    unknown
                )))
            }
        };

        let mut options = WaitOptions::default();
        if let Some(timeout) = keywords.get("timeout") {
            options.timeout = seconds_arg("timeout", timeout)?;
        }
        if let Some(interval) = keywords.get("interval") {
            options.interval = seconds_arg("interval", interval)?;
        }

        Ok(strategy.with_options(options))
    }
}

fn split_args(args: &Value) -> Result<(Vec<Value>, Map<String, Value>)> {
    match args {
        Value::Null => Ok((Vec::new(), Map::new())),
        Value::Object(keywords) => Ok((Vec::new(), keywords.clone())),
        Value::Array(items) => match items.split_last() {
            Some((Value::Object(keywords), positional)) => {
                Ok((positional.to_vec(), keywords.clone()))
            }
            _ => Ok((items.clone(), Map::new())),
        },
        scalar => Ok((vec![scalar.clone()], Map::new())),
    }
}

fn port_arg(value: &Value) -> Result<PortSpec> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| Error::InvalidArgument(format!("invalid port: {}", n)))?
            .to_port_spec(),
        Value::String(s) => s.to_port_spec(),
        other => Err(Error::InvalidArgument(format!("invalid port: {}", other))),
    }
}

fn seconds_arg(name: &str, value: &Value) -> Result<Duration> {
    let secs = value
        .as_f64()
        .ok_or_else(|| Error::InvalidArgument(format!("{} must be a number of seconds", name)))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::InvalidArgument(format!("invalid {} of {} seconds: {}", name, secs, e)))
}

/// Poll `probe` until it returns `true`, an error, or the deadline passes.
///
/// Returns [`Error::Timeout`] carrying `description` on deadline. The loop
/// always pauses `options.interval` between probes. A timeout too large to
/// represent as a deadline waits without one.
pub async fn poll_until<F, Fut>(description: &str, options: WaitOptions, mut probe: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let started = Instant::now();
    let deadline = started
        .checked_add(options.timeout)
        .unwrap_or_else(|| started + FAR_FUTURE);
    tracing::debug!("Waiting for {} (timeout {:?})", description, options.timeout);

    loop {
        if Instant::now() >= deadline {
            break;
        }

        match tokio::time::timeout_at(deadline, probe()).await {
            Ok(Ok(true)) => {
                tracing::debug!("Done waiting for {} after {:?}", description, started.elapsed());
                return Ok(());
            }
            Ok(Ok(false)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => break,
        }

        tokio::time::sleep(options.interval).await;
    }

    tracing::warn!("Timed out waiting for {}", description);
    Err(Error::Timeout(description.to_string()))
}

/// Try one TCP connection to `host:port`.
///
/// Refused, reset, unreachable and timed-out connections mean "not ready".
pub async fn tcp_probe(host: &str, port: u16) -> Result<bool> {
    match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => {
            drop(stream);
            Ok(true)
        }
        Ok(Err(e)) if is_not_ready(&e) => Ok(false),
        Ok(Err(e)) => Err(Error::Io(e)),
        Err(_) => Ok(false),
    }
}

fn is_not_ready(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;

    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
    )
}

/// Build the HTTP client used by [`http_probe`].
pub fn http_client(https: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(https)
        .timeout(PROBE_TIMEOUT)
        .build()
        .map_err(|e| Error::Http(e.to_string()))
}

/// Issue one GET to `url` and compare the status with `expected`.
///
/// Connect, timeout and send failures mean "not ready". Malformed requests
/// (bad scheme, invalid URL) fail as builder errors and propagate.
pub async fn http_probe(client: &reqwest::Client, url: &str, expected: u16) -> Result<bool> {
    match client.get(url).send().await {
        Ok(response) => Ok(response.status().as_u16() == expected),
        Err(e) if e.is_connect() || e.is_timeout() || e.is_request() => {
            tracing::trace!("HTTP probe {} not ready: {}", url, e);
            Ok(false)
        }
        Err(e) => Err(Error::Http(e.to_string())),
    }
}
