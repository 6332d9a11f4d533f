//! Nginx.

use berth_core::{ContainerSpec, DockerContainer, Result, WaitStrategy};

use crate::{address, env_port_or, Preset};

/// Default image.
pub const DEFAULT_IMAGE: &str = "nginx:latest";
/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 80;

/// Nginx web server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nginx {
    image: String,
    port: u16,
}

impl Default for Nginx {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl Nginx {
    /// Defaults overridden by `NGINX_PORT`.
    pub fn from_env() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            port: env_port_or("NGINX_PORT", DEFAULT_PORT),
        }
    }

    /// Use another image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Use another HTTP port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// HTTP port inside the container.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `http://host:port`.
    pub async fn server_url(&self, container: &DockerContainer) -> Result<String> {
        let (host, port) = address(container, self.port, false).await?;
        Ok(format!("http://{}:{}", host, port))
    }
}

impl Preset for Nginx {
    fn spec(&self) -> Result<ContainerSpec> {
        Ok(ContainerSpec::new(&self.image)
            .with_exposed_port(self.port)?
            .with_wait_for(WaitStrategy::logs("start worker process")?))
    }
}
