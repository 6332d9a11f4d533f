//! Elasticsearch.

use berth_core::{ContainerSpec, DockerContainer, HealthCheckOptions, Result, WaitStrategy};
use std::time::Duration;

use crate::{address, credentials_url, Preset};

/// Default image.
pub const DEFAULT_IMAGE: &str = "docker.elastic.co/elasticsearch/elasticsearch:8.7.1";
/// Default HTTP port.
pub const DEFAULT_HTTP_PORT: u16 = 9200;
/// Default transport port.
pub const DEFAULT_TCP_PORT: u16 = 9300;
/// Default user.
pub const DEFAULT_USERNAME: &str = "elastic";
/// Default password.
pub const DEFAULT_PASSWORD: &str = "elastic";

const SECURITY_ENV: &str = "xpack.security.enabled";

/// Single-node Elasticsearch cluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Elasticsearch {
    image: String,
    http_port: u16,
    tcp_port: u16,
    username: String,
    password: String,
    env: Vec<(String, String)>,
}

impl Default for Elasticsearch {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            tcp_port: DEFAULT_TCP_PORT,
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            env: Vec::new(),
        }
    }
}

impl Elasticsearch {
    /// Use another image.
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Use another password for the `elastic` user.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    /// Set a node setting, e.g. `xpack.security.enabled=true`.
    ///
    /// Settings given here take precedence over the single-node defaults.
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// HTTP port inside the container.
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// Transport port inside the container.
    pub fn tcp_port(&self) -> u16 {
        self.tcp_port
    }

    /// `http(s)://user:password@host:port`, HTTPS when security is enabled.
    pub async fn elasticsearch_url(&self, container: &DockerContainer) -> Result<String> {
        let protocol = match container.spec().get_env(SECURITY_ENV) {
            Some("true") => "https",
            _ => "http",
        };
        let (host, port) = address(container, self.http_port, false).await?;
        let url = credentials_url(protocol, &self.username, &self.password, &host, port, None)?;
        let mut url = String::from(url);
        // http(s) urls always carry a root path
        if url.ends_with('/') {
            url.pop();
        }
        Ok(url)
    }

    fn healthcheck(&self) -> HealthCheckOptions {
        HealthCheckOptions::new([
            "curl".to_string(),
            "--silent".to_string(),
            "--fail".to_string(),
            format!("localhost:{}/_cluster/health", self.http_port),
        ])
        .interval(1.0)
        .timeout(5.0)
        .retries(5)
    }
}

impl Preset for Elasticsearch {
    fn spec(&self) -> Result<ContainerSpec> {
        let mut spec = ContainerSpec::new(&self.image)
            .with_exposed_ports([self.http_port, self.tcp_port])?
            .with_healthcheck(self.healthcheck())?
            .with_wait_for(WaitStrategy::healthcheck().with_timeout(Duration::from_secs(180)))
            .with_env(("ELASTIC_PASSWORD", self.password.as_str()))?;

        for (key, value) in &self.env {
            spec.add_env((key.as_str(), value.as_str()))?;
        }
        if spec.get_env("discovery.type").is_none() {
            spec.add_env(("discovery.type", "single-node"))?;
        }
        if spec.get_env(SECURITY_ENV).is_none() {
            spec.add_env((SECURITY_ENV, "false"))?;
        }

        Ok(spec)
    }
}
