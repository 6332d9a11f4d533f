//! Docker engine backed by bollard.

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, InspectContainerOptions,
    KillContainerOptions, LogOutput, LogsOptions, RemoveContainerOptions,
    RestartContainerOptions, StartContainerOptions, StopContainerOptions,
    UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerInspectResponse, Network};
use bollard::network::{CreateNetworkOptions, InspectNetworkOptions};
use bollard::Docker;
use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt};
use std::collections::HashMap;

use super::{
    ContainerLogs, Engine, EngineError, ExecOutput, ExecRequest, NetworkRequest, PullOptions,
    RemoveOptions,
};
use crate::error::{Error, Result};

/// Label stamped on every created container and network identifying this library.
pub const CLIENT_LABEL: &str = "org.berth.client";

/// Seconds before a daemon request is abandoned.
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[cfg(windows)]
const DEFAULT_ENDPOINT: &str = "npipe:////./pipe/docker_engine";
#[cfg(not(windows))]
const DEFAULT_ENDPOINT: &str = "unix:///var/run/docker.sock";

/// Engine talking to a Docker-compatible daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
    endpoint: String,
}

impl std::fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DockerEngine")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl DockerEngine {
    /// Connect to the daemon at `endpoint`, or to the client defaults
    /// (`DOCKER_HOST`, then the local socket) when `endpoint` is `None`.
    ///
    /// Connecting does not contact the daemon; the first request does.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for an unsupported URL scheme and
    /// [`Error::Connection`] if the client cannot be configured.
    pub fn connect(endpoint: Option<&str>) -> Result<Self> {
        let Some(endpoint) = endpoint else {
            let docker = Docker::connect_with_local_defaults()
                .map_err(|e| Error::Connection(e.to_string()))?;
            let endpoint = std::env::var(crate::config::DOCKER_HOST_ENV)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
            tracing::debug!("Connected to container engine at {}", endpoint);
            return Ok(Self { docker, endpoint });
        };

        let plain_http = endpoint
            .strip_prefix("tcp://")
            .or_else(|| endpoint.strip_prefix("https://"));
        let connected = if let Some(rest) = plain_http {
            Docker::connect_with_http(
                &format!("http://{}", rest),
                REQUEST_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            )
        } else if endpoint.starts_with("http://") {
            Docker::connect_with_http(endpoint, REQUEST_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else if endpoint.starts_with("unix://") {
            connect_unix(endpoint)?
        } else if endpoint.starts_with("npipe://") {
            connect_named_pipe(endpoint)?
        } else {
            return Err(Error::InvalidArgument(format!(
                "unsupported engine endpoint: {}",
                endpoint
            )));
        };
        let docker = connected.map_err(|e| Error::Connection(e.to_string()))?;

        tracing::debug!("Connected to container engine at {}", endpoint);
        Ok(Self {
            docker,
            endpoint: endpoint.to_string(),
        })
    }

    /// Labels identifying this library, merged with registered client labels.
    fn identity_labels(mut labels: HashMap<String, String>) -> HashMap<String, String> {
        labels
            .entry(CLIENT_LABEL.to_string())
            .or_insert_with(|| format!("berth-rs/{}", env!("CARGO_PKG_VERSION")));
        for (key, value) in crate::connection::client_labels() {
            labels.entry(key).or_insert(value);
        }
        labels
    }
}

#[cfg(unix)]
fn connect_unix(endpoint: &str) -> Result<std::result::Result<Docker, bollard::errors::Error>> {
    Ok(Docker::connect_with_unix(
        endpoint,
        REQUEST_TIMEOUT_SECS,
        bollard::API_DEFAULT_VERSION,
    ))
}

#[cfg(not(unix))]
fn connect_unix(endpoint: &str) -> Result<std::result::Result<Docker, bollard::errors::Error>> {
    Err(Error::InvalidArgument(format!(
        "unix sockets are not supported on this platform: {}",
        endpoint
    )))
}

#[cfg(windows)]
fn connect_named_pipe(
    endpoint: &str,
) -> Result<std::result::Result<Docker, bollard::errors::Error>> {
    Ok(Docker::connect_with_named_pipe(
        endpoint,
        REQUEST_TIMEOUT_SECS,
        bollard::API_DEFAULT_VERSION,
    ))
}

#[cfg(not(windows))]
fn connect_named_pipe(
    endpoint: &str,
) -> Result<std::result::Result<Docker, bollard::errors::Error>> {
    Err(Error::InvalidArgument(format!(
        "named pipes are only supported on Windows: {}",
        endpoint
    )))
}

/// Split `repo[:tag]` into repository and tag, defaulting the tag to `latest`.
///
/// Digest references (`repo@sha256:...`) are passed through with an empty tag.
fn split_image_ref(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let name_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[name_start..].rfind(':') {
        Some(pos) => (&image[..name_start + pos], &image[name_start + pos + 1..]),
        None => (image, "latest"),
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        use bollard::errors::Error as DockerError;

        match e {
            DockerError::DockerResponseServerError {
                status_code,
                message,
            } => match status_code {
                304 => EngineError::NotModified,
                403 => EngineError::Forbidden(message),
                404 => EngineError::NotFound(message),
                409 => EngineError::Conflict(message),
                status => EngineError::Api { status, message },
            },
            DockerError::DockerStreamError { error } => EngineError::Stream(error),
            DockerError::JsonDataError { message, .. } => EngineError::Stream(message),
            DockerError::RequestTimeoutError => {
                EngineError::Unreachable("request timed out".to_string())
            }
            DockerError::IOError { err } => EngineError::Unreachable(err.to_string()),
            other => {
                if has_io_source(&other) {
                    EngineError::Unreachable(other.to_string())
                } else {
                    EngineError::Api {
                        status: 0,
                        message: other.to_string(),
                    }
                }
            }
        }
    }
}

/// Whether an I/O error sits anywhere in the source chain (connection refused and friends).
fn has_io_source(e: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = e.source();
    while let Some(source) = current {
        if source.is::<std::io::Error>() {
            return true;
        }
        current = source.source();
    }
    false
}

#[async_trait]
impl Engine for DockerEngine {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn image_exists(&self, image: &str) -> std::result::Result<bool, EngineError> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => match EngineError::from(e) {
                EngineError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn pull_image(
        &self,
        image: &str,
        options: &PullOptions,
    ) -> std::result::Result<(), EngineError> {
        let (repository, tag) = split_image_ref(image);
        tracing::info!("Pulling image {}", image);

        let pull = CreateImageOptions {
            from_image: repository.to_string(),
            tag: tag.to_string(),
            platform: options.platform.clone().unwrap_or_default(),
            ..Default::default()
        };
        let credentials = options.credentials.as_ref().map(|auth| DockerCredentials {
            username: Some(auth.username.clone()),
            password: Some(auth.password.clone()),
            serveraddress: auth.server_address.clone(),
            ..Default::default()
        });

        let mut stream = self.docker.create_image(Some(pull), None, credentials);
        while let Some(progress) = stream.next().await {
            let progress = progress?;
            if let Some(status) = progress.status {
                tracing::trace!("Pull {}: {}", image, status);
            }
        }

        tracing::info!("Pulled image {}", image);
        Ok(())
    }

    async fn create_container(
        &self,
        name: Option<&str>,
        mut config: Config<String>,
    ) -> std::result::Result<String, EngineError> {
        config.labels = Some(Self::identity_labels(config.labels.take().unwrap_or_default()));

        let options = name.map(|name| CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        });
        let created = self.docker.create_container(options, config).await?;
        for warning in &created.warnings {
            tracing::warn!("Container {} created with warning: {}", created.id, warning);
        }
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(
        &self,
        id: &str,
        timeout_secs: i64,
    ) -> std::result::Result<(), EngineError> {
        self.docker
            .stop_container(id, Some(StopContainerOptions { t: timeout_secs }))
            .await?;
        Ok(())
    }

    async fn kill_container(&self, id: &str, signal: &str) -> std::result::Result<(), EngineError> {
        self.docker
            .kill_container(
                id,
                Some(KillContainerOptions {
                    signal: signal.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    async fn restart_container(
        &self,
        id: &str,
        timeout_secs: isize,
    ) -> std::result::Result<(), EngineError> {
        self.docker
            .restart_container(id, Some(RestartContainerOptions { t: timeout_secs }))
            .await?;
        Ok(())
    }

    async fn remove_container(
        &self,
        id: &str,
        options: RemoveOptions,
    ) -> std::result::Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    v: options.volumes,
                    force: options.force,
                    link: false,
                }),
            )
            .await?;
        Ok(())
    }

    async fn inspect_container(
        &self,
        id: &str,
    ) -> std::result::Result<ContainerInspectResponse, EngineError> {
        Ok(self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?)
    }

    async fn logs(&self, id: &str) -> std::result::Result<ContainerLogs, EngineError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow: false,
            tail: "all".to_string(),
            ..Default::default()
        };

        let mut stream = self.docker.logs(id, Some(options));
        let mut logs = ContainerLogs::default();

        while let Some(output) = stream.next().await {
            match output? {
                LogOutput::StdErr { message } => {
                    logs.stderr.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    logs.stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdIn { .. } => {}
            }
        }

        Ok(logs)
    }

    async fn exec(
        &self,
        id: &str,
        request: &ExecRequest,
    ) -> std::result::Result<ExecOutput, EngineError> {
        let exec_options = CreateExecOptions {
            cmd: Some(request.cmd.clone()),
            env: (!request.env.is_empty()).then(|| request.env.clone()),
            user: request.user.clone(),
            working_dir: request.working_dir.clone(),
            tty: Some(request.tty),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(id, exec_options).await?;

        let mut result = ExecOutput::default();
        if let StartExecResults::Attached { mut output, .. } =
            self.docker.start_exec(&exec.id, None).await?
        {
            while let Some(msg) = output.next().await {
                match msg? {
                    LogOutput::StdErr { message } => {
                        result.stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        result.stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }

        let inspect = self.docker.inspect_exec(&exec.id).await?;
        result.exit_code = inspect.exit_code.unwrap_or(-1);

        Ok(result)
    }

    async fn upload_archive(
        &self,
        id: &str,
        dir: &str,
        archive: Vec<u8>,
    ) -> std::result::Result<(), EngineError> {
        let options = UploadToContainerOptions {
            path: dir.to_string(),
            ..Default::default()
        };
        self.docker
            .upload_to_container(id, Some(options), Bytes::from(archive))
            .await?;
        Ok(())
    }

    async fn download_archive(
        &self,
        id: &str,
        path: &str,
    ) -> std::result::Result<Vec<u8>, EngineError> {
        let options = DownloadFromContainerOptions {
            path: path.to_string(),
        };
        let chunks: Vec<Bytes> = self
            .docker
            .download_from_container(id, Some(options))
            .try_collect()
            .await?;
        Ok(chunks.concat())
    }

    async fn create_network(
        &self,
        request: &NetworkRequest,
    ) -> std::result::Result<String, EngineError> {
        let options = CreateNetworkOptions {
            name: request.name.clone(),
            check_duplicate: true,
            driver: request.driver.clone(),
            options: request.options.clone(),
            labels: Self::identity_labels(request.labels.clone()),
            ..Default::default()
        };

        let created = self.docker.create_network(options).await?;
        created.id.ok_or_else(|| EngineError::Api {
            status: 0,
            message: format!("network {} created without an id", request.name),
        })
    }

    async fn remove_network(&self, id: &str) -> std::result::Result<(), EngineError> {
        self.docker.remove_network(id).await?;
        Ok(())
    }

    async fn inspect_network(&self, id: &str) -> std::result::Result<Network, EngineError> {
        Ok(self
            .docker
            .inspect_network(id, None::<InspectNetworkOptions<String>>)
            .await?)
    }
}
