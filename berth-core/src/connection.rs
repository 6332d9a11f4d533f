//! Process-wide connection to the container engine.
//!
//! The endpoint is resolved once, on the first call to [`connection`], in this
//! order:
//!
//! 1. an explicit override set with [`set_endpoint`]
//! 2. `TESTCONTAINERS_HOST`
//! 3. `tc.host` in `~/.testcontainers.properties`
//! 4. the engine client's own default (`DOCKER_HOST` or the local socket)
//!
//! Once established the connection is never swapped for another endpoint.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use crate::config::Settings;
use crate::engine::{DockerEngine, Engine};
use crate::error::{Error, Result};

struct Established {
    endpoint: Option<String>,
    engine: Arc<dyn Engine>,
}

static CONNECTION: OnceLock<Established> = OnceLock::new();
static ENDPOINT_OVERRIDE: Mutex<Option<String>> = Mutex::new(None);
static CLIENT_LABELS: Mutex<BTreeMap<String, String>> = Mutex::new(BTreeMap::new());
static INIT: Mutex<()> = Mutex::new(());

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Where the engine endpoint came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    /// Set with [`set_endpoint`].
    Override(String),
    /// `TESTCONTAINERS_HOST`.
    Environment(String),
    /// The properties file.
    Properties(String),
    /// Nothing configured; the engine client decides.
    EngineDefault,
}

impl EndpointSource {
    /// The configured endpoint, if any.
    pub fn endpoint(&self) -> Option<&str> {
        match self {
            EndpointSource::Override(url)
            | EndpointSource::Environment(url)
            | EndpointSource::Properties(url) => Some(url),
            EndpointSource::EngineDefault => None,
        }
    }
}

/// Pick the endpoint from an explicit override and loaded settings.
pub fn resolve_endpoint(endpoint_override: Option<&str>, settings: &Settings) -> EndpointSource {
    if let Some(url) = endpoint_override.filter(|url| !url.is_empty()) {
        return EndpointSource::Override(url.to_string());
    }
    match &settings.engine_host {
        Some(url) if settings.engine_host_from_properties => EndpointSource::Properties(url.clone()),
        Some(url) => EndpointSource::Environment(url.clone()),
        None => EndpointSource::EngineDefault,
    }
}

/// Use `url` as the engine endpoint.
///
/// # Errors
///
/// [`Error::InvalidState`] if a connection to a different endpoint already exists.
pub fn set_endpoint(url: impl Into<String>) -> Result<()> {
    let url = url.into();
    if let Some(established) = CONNECTION.get() {
        if established.endpoint.as_deref() != Some(url.as_str()) {
            return Err(Error::InvalidState(format!(
                "engine connection already established to {}",
                established.engine.endpoint()
            )));
        }
        return Ok(());
    }

    *lock(&ENDPOINT_OVERRIDE) = Some(url);
    Ok(())
}

/// The process-wide engine connection, established on first use.
///
/// Connectivity problems surface on the first request, not here.
///
/// # Errors
///
/// [`Error::Config`] if the properties file exists but cannot be read.
pub fn connection() -> Result<Arc<dyn Engine>> {
    if let Some(established) = CONNECTION.get() {
        return Ok(Arc::clone(&established.engine));
    }

    let _init = lock(&INIT);
    if let Some(established) = CONNECTION.get() {
        return Ok(Arc::clone(&established.engine));
    }

    let endpoint_override = lock(&ENDPOINT_OVERRIDE).clone();
    let source = resolve_endpoint(endpoint_override.as_deref(), &Settings::try_load()?);
    tracing::debug!("Resolved engine endpoint: {:?}", source);

    let engine: Arc<dyn Engine> = Arc::new(DockerEngine::connect(source.endpoint())?);
    let established = CONNECTION.get_or_init(|| Established {
        endpoint: source.endpoint().map(str::to_string),
        engine,
    });
    tracing::info!("Using container engine at {}", established.engine.endpoint());
    Ok(Arc::clone(&established.engine))
}

/// Stamp `key=value` on every container and network created from now on.
///
/// Returns `false` if `key` was already registered; the first value is kept.
pub fn register_client_label(key: impl Into<String>, value: impl Into<String>) -> bool {
    let mut labels = lock(&CLIENT_LABELS);
    let key = key.into();
    if labels.contains_key(&key) {
        return false;
    }
    tracing::debug!("Registered client label {}", key);
    labels.insert(key, value.into());
    true
}

/// Labels registered with [`register_client_label`].
pub fn client_labels() -> Vec<(String, String)> {
    lock(&CLIENT_LABELS)
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
