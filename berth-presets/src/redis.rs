//! Redis.

use berth_core::{ContainerSpec, DockerContainer, Result, WaitStrategy};

use crate::{address, credentials_url, env_port_or, Preset};

/// Default image.
pub const DEFAULT_IMAGE: &str = "redis:latest";
/// Default server port.
pub const DEFAULT_PORT: u16 = 6379;

/// Redis server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redis {
    image: String,
    port: u16,
    password: Option<String>,
}

impl Default for Redis {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: DEFAULT_PORT,
            password: None,
        }
    }
}

impl Redis {
    /// Defaults overridden by `REDIS_PORT` and `REDIS_PASSWORD`.
    pub fn from_env() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: env_port_or("REDIS_PORT", DEFAULT_PORT),
            password: std::env::var("REDIS_PASSWORD").ok().filter(|p| !p.is_empty()),
        }
    }

    /// Use another image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Use another server port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Require a password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    /// Server port inside the container.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `redis://[:password@]host:port/db`.
    pub async fn redis_url(&self, container: &DockerContainer, db: u32) -> Result<String> {
        self.redis_url_with(container, "redis", db).await
    }

    /// Connection URL with another scheme, e.g. `rediss`.
    pub async fn redis_url_with(
        &self,
        container: &DockerContainer,
        protocol: &str,
        db: u32,
    ) -> Result<String> {
        let (host, port) = address(container, self.port, false).await?;
        let password = self.password.as_deref().unwrap_or_default();
        let url = credentials_url(protocol, "", password, &host, port, Some(&db.to_string()))?;
        Ok(url.into())
    }
}

impl Preset for Redis {
    fn spec(&self) -> Result<ContainerSpec> {
        let mut spec = ContainerSpec::new(&self.image).with_exposed_port(self.port)?;
        if let Some(password) = &self.password {
            spec.add_env(("REDIS_PASSWORD", password.as_str()))?;
            spec.set_command(["redis-server", "--requirepass", password.as_str()]);
        }
        Ok(spec.with_wait_for(WaitStrategy::logs("Ready to accept connections")?))
    }
}
