//! Mock engine for testing.
//!
//! Keeps images, containers and networks in memory, assigns ephemeral host
//! ports on start, and lets tests script logs, health, exec results and
//! failures. Log and health scripts are driven by `tokio::time`, so tests
//! running with paused time see them appear deterministically.

use super::{
    ContainerLogs, Engine, EngineError, ExecOutput, ExecRequest, NetworkRequest, PullOptions,
    RemoveOptions,
};
use async_trait::async_trait;
use bollard::container::Config;
use bollard::models::{
    ContainerConfig, ContainerInspectResponse, ContainerState, ContainerStateStatusEnum,
    EndpointSettings, Health, HealthStatusEnum, Network, NetworkSettings, PortBinding,
};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// First host port handed out for dynamic bindings.
pub const FIRST_EPHEMERAL_PORT: u16 = 49153;

/// Mock engine for testing.
#[derive(Debug)]
pub struct MockEngine {
    inner: Arc<Mutex<MockEngineInner>>,
    endpoint: Arc<str>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            inner: Arc::default(),
            endpoint: Arc::from("unix:///var/run/docker.sock"),
        }
    }
}

impl Clone for MockEngine {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            endpoint: Arc::clone(&self.endpoint),
        }
    }
}

#[derive(Debug)]
struct MockContainer {
    name: Option<String>,
    config: Config<String>,
    status: ContainerStateStatusEnum,
    started_at: Option<Instant>,
    ports: HashMap<String, Option<Vec<PortBinding>>>,
    files: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug)]
struct MockEngineInner {
    images: HashSet<String>,
    missing_images: HashSet<String>,
    containers: HashMap<String, MockContainer>,
    networks: HashMap<String, NetworkRequest>,
    next_id: u64,
    next_port: u16,
    bridge_ip: String,
    gateway: String,
    scripted_logs: Vec<(Duration, String)>,
    healthy_after: Option<Duration>,
    exec_responses: VecDeque<ExecOutput>,
    exec_requests: Vec<ExecRequest>,
    failures: HashMap<String, EngineError>,
    calls: Vec<String>,
}

impl Default for MockEngineInner {
    fn default() -> Self {
        Self {
            images: HashSet::new(),
            missing_images: HashSet::new(),
            containers: HashMap::new(),
            networks: HashMap::new(),
            next_id: 1,
            next_port: FIRST_EPHEMERAL_PORT,
            bridge_ip: "172.17.0.2".to_string(),
            gateway: "172.17.0.1".to_string(),
            scripted_logs: Vec::new(),
            healthy_after: None,
            exec_responses: VecDeque::new(),
            exec_requests: Vec::new(),
            failures: HashMap::new(),
            calls: Vec::new(),
        }
    }
}

impl MockEngineInner {
    /// Record a call and return a scripted failure for it, if any.
    fn enter(&mut self, op: &str) -> Result<(), EngineError> {
        self.calls.push(op.to_string());
        match self.failures.remove(op) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn container(&mut self, id: &str) -> Result<&mut MockContainer, EngineError> {
        self.containers
            .get_mut(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", id)))
    }

    fn next_id(&mut self) -> String {
        let id = format!("{:064x}", self.next_id);
        self.next_id += 1;
        id
    }

    /// Bind every exposed port, honouring fixed host ports.
    fn assign_ports(&mut self, id: &str) -> Result<(), EngineError> {
        let container = self
            .containers
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("No such container: {}", id)))?;

        let mut exposed: Vec<String> = container
            .config
            .exposed_ports
            .as_ref()
            .map(|ports| ports.keys().cloned().collect())
            .unwrap_or_default();
        exposed.sort_by_key(|port| {
            port.split('/')
                .next()
                .and_then(|number| number.parse::<u16>().ok())
                .unwrap_or(u16::MAX)
        });
        let fixed = container
            .config
            .host_config
            .as_ref()
            .and_then(|hc| hc.port_bindings.clone())
            .unwrap_or_default();

        let mut ports = HashMap::new();
        for port in exposed {
            let requested = fixed
                .get(&port)
                .and_then(|bindings| bindings.as_ref())
                .and_then(|bindings| bindings.first())
                .and_then(|binding| binding.host_port.clone())
                .filter(|host_port| !host_port.is_empty());

            let host_port = match requested {
                Some(host_port) => host_port,
                None => {
                    let allocated = self.next_port;
                    self.next_port += 1;
                    allocated.to_string()
                }
            };

            ports.insert(
                port,
                Some(vec![PortBinding {
                    host_ip: Some("0.0.0.0".to_string()),
                    host_port: Some(host_port),
                }]),
            );
        }

        self.container(id)?.ports = ports;
        Ok(())
    }

    fn start(&mut self, id: &str) -> Result<(), EngineError> {
        self.assign_ports(id)?;
        let container = self.container(id)?;
        container.status = ContainerStateStatusEnum::RUNNING;
        container.started_at = Some(Instant::now());
        Ok(())
    }

    fn attached_containers(&self, network: &str) -> usize {
        self.containers
            .values()
            .filter(|c| {
                c.config
                    .host_config
                    .as_ref()
                    .and_then(|hc| hc.network_mode.as_deref())
                    == Some(network)
            })
            .count()
    }
}

impl MockEngine {
    /// Create a new mock engine with no images, containers or networks.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockEngineInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Report a different endpoint URL.
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Arc::from(endpoint);
        self
    }

    /// Mark an image as already present locally.
    pub fn add_image(&self, image: &str) {
        self.lock().images.insert(image.to_string());
    }

    /// Make pulls of `image` fail with "not found".
    pub fn deny_image(&self, image: &str) {
        self.lock().missing_images.insert(image.to_string());
    }

    /// Set the bridge IP and gateway reported for running containers.
    pub fn set_bridge(&self, ip: &str, gateway: &str) {
        let mut inner = self.lock();
        inner.bridge_ip = ip.to_string();
        inner.gateway = gateway.to_string();
    }

    /// Make every started container print `line` once `delay` has passed since it started.
    pub fn emit_log_after(&self, delay: Duration, line: &str) {
        self.lock().scripted_logs.push((delay, line.to_string()));
    }

    /// Report containers with a health check as healthy once `delay` has passed
    /// since they started. Until then they report `starting`.
    pub fn healthy_after(&self, delay: Duration) {
        self.lock().healthy_after = Some(delay);
    }

    /// Queue the result of the next exec call.
    pub fn queue_exec(&self, output: ExecOutput) {
        self.lock().exec_responses.push_back(output);
    }

    /// Cause the next call to `op` (a trait method name) to fail with `error`.
    pub fn fail_next(&self, op: &str, error: EngineError) {
        self.lock().failures.insert(op.to_string(), error);
    }

    /// Names of every trait method called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Number of times `op` was called.
    pub fn call_count(&self, op: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// Configuration a container was created with.
    pub fn created_config(&self, id: &str) -> Option<Config<String>> {
        self.lock().containers.get(id).map(|c| c.config.clone())
    }

    /// Name a container was created with.
    pub fn created_name(&self, id: &str) -> Option<String> {
        self.lock().containers.get(id).and_then(|c| c.name.clone())
    }

    /// Ids of containers that still exist.
    pub fn container_ids(&self) -> Vec<String> {
        self.lock().containers.keys().cloned().collect()
    }

    /// Names of networks that still exist.
    pub fn network_names(&self) -> Vec<String> {
        self.lock().networks.values().map(|n| n.name.clone()).collect()
    }

    /// Every exec request received so far.
    pub fn exec_requests(&self) -> Vec<ExecRequest> {
        self.lock().exec_requests.clone()
    }

    /// Contents of a file inside a container.
    pub fn file(&self, id: &str, path: &str) -> Option<Vec<u8>> {
        self.lock()
            .containers
            .get(id)
            .and_then(|c| c.files.get(path).cloned())
    }

    /// Place a file inside a container.
    pub fn put_file(&self, id: &str, path: &str, content: &[u8]) {
        if let Some(container) = self.lock().containers.get_mut(id) {
            container.files.insert(path.to_string(), content.to_vec());
        }
    }
}

#[async_trait]
impl Engine for MockEngine {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn image_exists(&self, image: &str) -> Result<bool, EngineError> {
        let mut inner = self.lock();
        inner.enter("image_exists")?;
        Ok(inner.images.contains(image))
    }

    async fn pull_image(&self, image: &str, _options: &PullOptions) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("pull_image")?;
        if inner.missing_images.contains(image) {
            return Err(EngineError::NotFound(format!(
                "pull access denied for {}, repository does not exist",
                image
            )));
        }
        inner.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(
        &self,
        name: Option<&str>,
        config: Config<String>,
    ) -> Result<String, EngineError> {
        let mut inner = self.lock();
        inner.enter("create_container")?;

        let image = config.image.clone().unwrap_or_default();
        if !inner.images.contains(&image) {
            return Err(EngineError::NotFound(format!("No such image: {}", image)));
        }
        if let Some(name) = name {
            if inner.containers.values().any(|c| c.name.as_deref() == Some(name)) {
                return Err(EngineError::Conflict(format!(
                    "container name {} is already in use",
                    name
                )));
            }
        }

        let id = inner.next_id();
        inner.containers.insert(
            id.clone(),
            MockContainer {
                name: name.map(str::to_string),
                config,
                status: ContainerStateStatusEnum::CREATED,
                started_at: None,
                ports: HashMap::new(),
                files: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("start_container")?;
        if inner.container(id)?.status == ContainerStateStatusEnum::RUNNING {
            return Err(EngineError::NotModified);
        }
        inner.start(id)
    }

    async fn stop_container(&self, id: &str, _timeout_secs: i64) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("stop_container")?;
        let container = inner.container(id)?;
        if container.status != ContainerStateStatusEnum::RUNNING {
            return Err(EngineError::NotModified);
        }
        container.status = ContainerStateStatusEnum::EXITED;
        container.ports.clear();
        Ok(())
    }

    async fn kill_container(&self, id: &str, _signal: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("kill_container")?;
        let container = inner.container(id)?;
        if container.status != ContainerStateStatusEnum::RUNNING {
            return Err(EngineError::Conflict(format!("Container {} is not running", id)));
        }
        container.status = ContainerStateStatusEnum::EXITED;
        container.ports.clear();
        Ok(())
    }

    async fn restart_container(&self, id: &str, _timeout_secs: isize) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("restart_container")?;
        inner.container(id)?;
        inner.start(id)
    }

    async fn remove_container(&self, id: &str, options: RemoveOptions) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("remove_container")?;
        let container = inner.container(id)?;
        if container.status == ContainerStateStatusEnum::RUNNING && !options.force {
            return Err(EngineError::Conflict(format!(
                "You cannot remove a running container {}",
                id
            )));
        }
        inner.containers.remove(id);
        Ok(())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerInspectResponse, EngineError> {
        let mut inner = self.lock();
        inner.enter("inspect_container")?;
        let bridge_ip = inner.bridge_ip.clone();
        let gateway = inner.gateway.clone();
        let healthy_after = inner.healthy_after;
        let container = inner.container(id)?;

        let running = container.status == ContainerStateStatusEnum::RUNNING;
        let health = container.config.healthcheck.as_ref().map(|_| {
            let elapsed = container.started_at.map(|t| t.elapsed());
            let status = match (running, healthy_after, elapsed) {
                (false, _, _) => HealthStatusEnum::UNHEALTHY,
                (true, Some(delay), Some(elapsed)) if elapsed < delay => HealthStatusEnum::STARTING,
                (true, _, _) => HealthStatusEnum::HEALTHY,
            };
            Health {
                status: Some(status),
                ..Default::default()
            }
        });

        let network_settings = running.then(|| NetworkSettings {
            ports: Some(container.ports.clone()),
            ip_address: Some(bridge_ip.clone()),
            gateway: Some(gateway.clone()),
            networks: Some(HashMap::from([(
                "bridge".to_string(),
                EndpointSettings {
                    ip_address: Some(bridge_ip),
                    gateway: Some(gateway),
                    ..Default::default()
                },
            )])),
            ..Default::default()
        });

        Ok(ContainerInspectResponse {
            id: Some(id.to_string()),
            name: container.name.as_ref().map(|n| format!("/{}", n)),
            created: Some("2024-01-01T00:00:00.000000000Z".to_string()),
            image: container.config.image.clone(),
            state: Some(ContainerState {
                status: Some(container.status),
                running: Some(running),
                health,
                ..Default::default()
            }),
            config: Some(ContainerConfig {
                image: container.config.image.clone(),
                env: container.config.env.clone(),
                cmd: container.config.cmd.clone(),
                entrypoint: container.config.entrypoint.clone(),
                working_dir: container.config.working_dir.clone(),
                labels: container.config.labels.clone(),
                exposed_ports: container.config.exposed_ports.clone(),
                healthcheck: container.config.healthcheck.clone(),
                ..Default::default()
            }),
            host_config: container.config.host_config.clone(),
            network_settings,
            ..Default::default()
        })
    }

    async fn logs(&self, id: &str) -> Result<ContainerLogs, EngineError> {
        let mut inner = self.lock();
        inner.enter("logs")?;
        let scripted = inner.scripted_logs.clone();
        let container = inner.container(id)?;

        let mut logs = ContainerLogs::default();
        if let Some(started_at) = container.started_at {
            let elapsed = started_at.elapsed();
            for (delay, line) in scripted {
                if elapsed >= delay {
                    logs.stdout.push_str(&line);
                    logs.stdout.push('\n');
                }
            }
        }
        Ok(logs)
    }

    async fn exec(&self, id: &str, request: &ExecRequest) -> Result<ExecOutput, EngineError> {
        let mut inner = self.lock();
        inner.enter("exec")?;
        if inner.container(id)?.status != ContainerStateStatusEnum::RUNNING {
            return Err(EngineError::Conflict(format!("Container {} is not running", id)));
        }
        inner.exec_requests.push(request.clone());
        Ok(inner.exec_responses.pop_front().unwrap_or_default())
    }

    async fn upload_archive(
        &self,
        id: &str,
        dir: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("upload_archive")?;
        let container = inner.container(id)?;

        let mut tar = tar::Archive::new(archive.as_slice());
        let entries = tar
            .entries()
            .map_err(|e| EngineError::Api { status: 400, message: e.to_string() })?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| EngineError::Api { status: 400, message: e.to_string() })?;
            let name = entry
                .path()
                .map_err(|e| EngineError::Api { status: 400, message: e.to_string() })?
                .to_string_lossy()
                .into_owned();
            let mut content = Vec::new();
            entry
                .read_to_end(&mut content)
                .map_err(|e| EngineError::Api { status: 400, message: e.to_string() })?;
            let path = format!("{}/{}", dir.trim_end_matches('/'), name);
            container.files.insert(path, content);
        }
        Ok(())
    }

    async fn download_archive(&self, id: &str, path: &str) -> Result<Vec<u8>, EngineError> {
        let mut inner = self.lock();
        inner.enter("download_archive")?;
        let container = inner.container(id)?;
        let content = container
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("Could not find the file {}", path)))?;

        let file_name = path.rsplit('/').next().unwrap_or(path);
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        let mut builder = tar::Builder::new(Vec::new());
        builder
            .append_data(&mut header, file_name, content.as_slice())
            .map_err(|e| EngineError::Stream(e.to_string()))?;
        builder
            .into_inner()
            .map_err(|e| EngineError::Stream(e.to_string()))
    }

    async fn create_network(&self, request: &NetworkRequest) -> Result<String, EngineError> {
        let mut inner = self.lock();
        inner.enter("create_network")?;
        if inner.networks.values().any(|n| n.name == request.name) {
            return Err(EngineError::Conflict(format!(
                "network with name {} already exists",
                request.name
            )));
        }
        let id = inner.next_id();
        inner.networks.insert(id.clone(), request.clone());
        Ok(id)
    }

    async fn remove_network(&self, id: &str) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.enter("remove_network")?;
        let name = inner
            .networks
            .get(id)
            .map(|n| n.name.clone())
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", id)))?;
        if inner.attached_containers(&name) > 0 || inner.attached_containers(id) > 0 {
            return Err(EngineError::Forbidden(format!(
                "error while removing network: network {} has active endpoints",
                name
            )));
        }
        inner.networks.remove(id);
        Ok(())
    }

    async fn inspect_network(&self, id: &str) -> Result<Network, EngineError> {
        let mut inner = self.lock();
        inner.enter("inspect_network")?;
        let request = inner
            .networks
            .get(id)
            .ok_or_else(|| EngineError::NotFound(format!("network {} not found", id)))?;
        Ok(Network {
            id: Some(id.to_string()),
            name: Some(request.name.clone()),
            driver: Some(request.driver.clone()),
            labels: Some(request.labels.clone()),
            options: Some(request.options.clone()),
            ..Default::default()
        })
    }
}
