//! Settings resolution for reaching the container engine.
//!
//! Settings come from the process environment and, as a fallback, from a
//! `key=value` properties file in the user's home directory
//! (`~/.testcontainers.properties`).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the engine endpoint.
pub const ENGINE_HOST_ENV: &str = "TESTCONTAINERS_HOST";

/// Environment variable naming the externally reachable host, used verbatim.
pub const HOST_OVERRIDE_ENV: &str = "TC_HOST";

/// Environment variable read by the engine client itself.
pub const DOCKER_HOST_ENV: &str = "DOCKER_HOST";

/// Properties file name, relative to the home directory.
pub const PROPERTIES_FILE_NAME: &str = ".testcontainers.properties";

/// Properties key holding the engine endpoint.
pub const PROPERTIES_HOST_KEY: &str = "tc.host";

/// Marker file present when the current process runs inside a container.
pub const DOCKERENV_PATH: &str = "/.dockerenv";

/// Resolved settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Engine endpoint from the environment or properties file.
    pub engine_host: Option<String>,
    /// Whether `engine_host` came from the properties file.
    pub engine_host_from_properties: bool,
    /// Externally reachable host override (`TC_HOST`).
    pub host_override: Option<String>,
    /// Value of `DOCKER_HOST`, if set.
    pub docker_host: Option<String>,
}

impl Settings {
    /// Load settings from the process environment and the properties file.
    ///
    /// A malformed or unreadable properties file is logged and treated as absent.
    pub fn load() -> Self {
        Self::try_load().unwrap_or_else(|e| {
            tracing::warn!("Ignoring properties file: {}", e);
            Self::from_sources(|key| std::env::var(key).ok(), None)
        })
    }

    /// Load settings, failing if the properties file exists but cannot be read.
    ///
    /// A malformed file is still logged and treated as absent.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadError`] for I/O failures other than a missing file.
    pub fn try_load() -> Result<Self, ConfigError> {
        Self::try_load_from(properties_path().as_deref(), |key| std::env::var(key).ok())
    }

    /// [`Settings::try_load`] with an explicit properties path and environment lookup.
    pub fn try_load_from<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let properties = match path.map(Properties::load).transpose() {
            Ok(properties) => properties.flatten(),
            Err(e @ ConfigError::ParseError { .. }) => {
                tracing::warn!("Ignoring malformed properties file: {}", e);
                None
            }
            Err(e) => return Err(e),
        };

        Ok(Self::from_sources(env, properties.as_ref()))
    }

    /// Build settings from an explicit environment lookup and properties.
    ///
    /// The environment wins over the properties file. Empty values count as unset.
    pub fn from_sources<F>(env: F, properties: Option<&Properties>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| env(key).filter(|v| !v.is_empty());

        let from_env = lookup(ENGINE_HOST_ENV);
        let from_properties = properties
            .and_then(|p| p.get(PROPERTIES_HOST_KEY))
            .filter(|v| !v.is_empty())
            .map(str::to_string);
        let engine_host_from_properties = from_env.is_none() && from_properties.is_some();

        Self {
            engine_host: from_env.or(from_properties),
            engine_host_from_properties,
            host_override: lookup(HOST_OVERRIDE_ENV),
            docker_host: lookup(DOCKER_HOST_ENV),
        }
    }
}

/// Path of the properties file, if a home directory can be determined.
pub fn properties_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(PROPERTIES_FILE_NAME))
}

/// Parsed `key=value` properties.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Load properties from a file. Returns `Ok(None)` if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        Self::parse(&content)
            .map(Some)
            .map_err(|(line, reason)| ConfigError::ParseError {
                path: path.to_path_buf(),
                line,
                reason,
            })
    }

    /// Parse properties text.
    ///
    /// Lines starting with `#` or `!` are comments. Separators are `=` or `:`.
    /// On failure returns the 1-based line number and a reason.
    pub fn parse(content: &str) -> Result<Self, (usize, String)> {
        let mut entries = BTreeMap::new();

        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let (key, value) = match line.find(['=', ':']) {
                Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
                None => (line, ""),
            };

            if key.is_empty() {
                return Err((index + 1, "missing key".to_string()));
            }

            entries.insert(key.to_string(), value.to_string());
        }

        Ok(Self { entries })
    }

    /// Look up a property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the properties file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the properties file.
    #[error("failed to parse config file {path} at line {line}: {reason}")]
    ParseError {
        /// Path to the file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        reason: String,
    },
}
