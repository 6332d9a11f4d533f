//! Network manager.
//!
//! [`Network`] wraps one engine-side network. Creation and removal are
//! serialized through an internal mutex so several owners can race to
//! materialize or tear down the same network.
//!
//! The shared network is owned by a [`SharedNetworkRegistry`] constructed by
//! the test bootstrap. It survives ordinary [`Network::close`] calls and is
//! force-closed exactly once, either through
//! [`SharedNetworkRegistry::shutdown`] or when the registry is dropped.
//! Dropping only tears down outside a runtime or on a multi-thread runtime;
//! on a current-thread runtime call `shutdown().await` instead.

use bollard::models::Network as NetworkInfo;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Mutex;

use crate::engine::{Engine, EngineError, NetworkRequest};
use crate::error::{Error, Result};

/// Driver used unless another is requested.
pub const DEFAULT_DRIVER: &str = "bridge";

/// Name of the process-wide shared network.
pub const SHARED_NETWORK_NAME: &str = "berth-shared-network";

/// Handle on one engine-side network.
pub struct Network {
    name: String,
    driver: String,
    options: HashMap<String, String>,
    shared: bool,
    engine: Arc<dyn Engine>,
    id: Mutex<Option<String>>,
}

impl fmt::Debug for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Network")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("shared", &self.shared)
            .finish_non_exhaustive()
    }
}

impl Network {
    /// A network with a generated name on the process-wide engine connection.
    pub fn new() -> Result<Self> {
        Ok(Self::with_engine(crate::connection::connection()?))
    }

    /// A network with a generated name on an explicit engine.
    pub fn with_engine(engine: Arc<dyn Engine>) -> Self {
        Self {
            name: Self::generate_name(),
            driver: DEFAULT_DRIVER.to_string(),
            options: HashMap::new(),
            shared: false,
            engine,
            id: Mutex::new(None),
        }
    }

    fn shared(engine: Arc<dyn Engine>) -> Self {
        Self {
            name: SHARED_NETWORK_NAME.to_string(),
            shared: true,
            ..Self::with_engine(engine)
        }
    }

    /// Use `name` instead of a generated one.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Use another driver.
    pub fn with_driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = driver.into();
        self
    }

    /// Add a driver option.
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// `berth-network-<uuid>`.
    pub fn generate_name() -> String {
        format!("berth-network-{}", uuid::Uuid::new_v4())
    }

    /// Network name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Network driver.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// Driver options.
    pub fn options(&self) -> &HashMap<String, String> {
        &self.options
    }

    /// Whether this is the shared network.
    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Whether the engine-side network exists.
    pub async fn is_created(&self) -> bool {
        self.id.lock().await.is_some()
    }

    /// Engine id, once created.
    pub async fn id(&self) -> Option<String> {
        self.id.lock().await.clone()
    }

    /// Create the network if it does not exist yet and return its id.
    ///
    /// # Errors
    ///
    /// [`Error::NetworkAlreadyExists`] if another network already has this name.
    pub async fn create(&self) -> Result<String> {
        let mut id = self.id.lock().await;
        if let Some(existing) = id.as_ref() {
            return Ok(existing.clone());
        }

        let request = NetworkRequest {
            name: self.name.clone(),
            driver: self.driver.clone(),
            options: self.options.clone(),
            labels: HashMap::new(),
        };
        let created = match self.engine.create_network(&request).await {
            Ok(created) => created,
            Err(EngineError::Conflict(_)) => {
                return Err(Error::NetworkAlreadyExists(self.name.clone()))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Created network {} ({})", self.name, created);
        *id = Some(created.clone());
        Ok(created)
    }

    /// Inspect document, creating the network first if needed.
    pub async fn info(&self) -> Result<NetworkInfo> {
        let id = self.create().await?;
        Ok(self.engine.inspect_network(&id).await?)
    }

    /// Remove the network. A no-op for the shared network unless `force`.
    ///
    /// Removing a network that is already gone succeeds.
    ///
    /// # Errors
    ///
    /// [`Error::NetworkInUse`] if containers are still attached; the handle
    /// stays created so the call can be retried.
    pub async fn close(&self, force: bool) -> Result<()> {
        if self.shared && !force {
            tracing::debug!("Keeping shared network {}", self.name);
            return Ok(());
        }

        let mut id = self.id.lock().await;
        let Some(current) = id.as_deref() else {
            return Ok(());
        };

        match self.engine.remove_network(current).await {
            Ok(()) => tracing::info!("Removed network {}", self.name),
            Err(EngineError::NotFound(_)) => {
                tracing::debug!("Network {} already gone", self.name);
            }
            Err(EngineError::Forbidden(_) | EngineError::Conflict(_)) => {
                return Err(Error::NetworkInUse(self.name.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        *id = None;
        Ok(())
    }

    /// Remove the network, shared or not.
    pub async fn force_close(&self) -> Result<()> {
        self.close(true).await
    }
}

/// Owner of the shared network.
///
/// Build one per test process and pass it down. Teardown is registered once
/// no matter how often [`get_or_create_shared`](Self::get_or_create_shared)
/// is called.
pub struct SharedNetworkRegistry {
    engine: Arc<dyn Engine>,
    shared: OnceLock<Arc<Network>>,
    cleanup_registered: AtomicBool,
    closed: AtomicBool,
}

impl fmt::Debug for SharedNetworkRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedNetworkRegistry")
            .field("shared", &self.shared.get())
            .field("cleanup_registered", &self.cleanup_registered)
            .field("closed", &self.closed)
            .finish()
    }
}

impl SharedNetworkRegistry {
    /// Registry on an explicit engine.
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self {
            engine,
            shared: OnceLock::new(),
            cleanup_registered: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Registry on the process-wide engine connection.
    pub fn connect() -> Result<Self> {
        Ok(Self::new(crate::connection::connection()?))
    }

    /// The shared network, created on first use.
    pub async fn get_or_create_shared(&self) -> Result<Arc<Network>> {
        let network = Arc::clone(
            self.shared
                .get_or_init(|| Arc::new(Network::shared(Arc::clone(&self.engine)))),
        );

        if !self.cleanup_registered.swap(true, Ordering::SeqCst) {
            tracing::debug!("Registered teardown for shared network {}", network.name());
        }

        network.create().await?;
        Ok(network)
    }

    /// Number of teardown registrations (0 or 1).
    pub fn cleanup_registrations(&self) -> usize {
        usize::from(self.cleanup_registered.load(Ordering::SeqCst))
    }

    /// Force-close the shared network. Once it succeeds, later calls and the
    /// drop are no-ops; after a failure the call can be retried.
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(network) = self.shared.get() {
            network.force_close().await?;
        }
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for SharedNetworkRegistry {
    fn drop(&mut self) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let Some(network) = self.shared.get().cloned() else {
            return;
        };

        // Pooled engine connections are driven by the runtime the registry
        // lives on, so that runtime must keep running during teardown.
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                let closed =
                    tokio::task::block_in_place(|| handle.block_on(network.force_close()));
                report_teardown(&network, closed);
            }
            Ok(_) => {
                tracing::warn!(
                    "Shared network {} left behind: registry dropped on a current-thread runtime, call shutdown().await first",
                    network.name()
                );
            }
            Err(_) => {
                let name = network.name().to_string();
                let teardown = std::thread::spawn(move || {
                    match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => {
                            let closed = runtime.block_on(network.force_close());
                            report_teardown(&network, closed);
                        }
                        Err(e) => {
                            tracing::warn!("Cannot remove shared network {}: {}", network.name(), e)
                        }
                    }
                });
                if teardown.join().is_err() {
                    tracing::warn!("Teardown of shared network {} panicked", name);
                }
            }
        }
    }
}

fn report_teardown(network: &Network, closed: Result<()>) {
    if let Err(e) = closed {
        tracing::warn!("Failed to remove shared network {}: {}", network.name(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{DockerContainer, HostEnvironment};
    use crate::engine::MockEngine;
    use crate::spec::ContainerSpec;

    fn network(engine: &MockEngine) -> Network {
        Network::with_engine(Arc::new(engine.clone()))
    }

    // ===========================================
    // Network
    // ===========================================

    #[test]
    fn generated_names_are_unique() {
        let a = Network::generate_name();
        let b = Network::generate_name();
        assert!(a.starts_with("berth-network-"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let engine = MockEngine::new();
        let network = network(&engine).with_driver("bridge").with_option("com.example.mtu", "1400");

        assert!(!network.is_created().await);
        let first = network.create().await.unwrap();
        let second = network.create().await.unwrap();

        assert_eq!(first, second);
        assert!(network.is_created().await);
        assert_eq!(engine.call_count("create_network"), 1);
        assert_eq!(engine.network_names(), vec![network.name().to_string()]);
    }

    #[tokio::test]
    async fn name_collision_is_network_already_exists() {
        let engine = MockEngine::new();
        network(&engine).with_name("taken").create().await.unwrap();

        let err = network(&engine).with_name("taken").create().await.unwrap_err();
        assert!(matches!(err, Error::NetworkAlreadyExists(ref name) if name == "taken"));
    }

    #[tokio::test]
    async fn info_reports_name_and_driver() {
        let engine = MockEngine::new();
        let network = network(&engine).with_name("info-net");

        let info = network.info().await.unwrap();
        assert_eq!(info.name.as_deref(), Some("info-net"));
        assert_eq!(info.driver.as_deref(), Some(DEFAULT_DRIVER));
        assert!(network.is_created().await);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let engine = MockEngine::new();
        let network = network(&engine);

        network.close(false).await.unwrap();
        network.create().await.unwrap();
        network.close(false).await.unwrap();
        network.close(false).await.unwrap();

        assert!(!network.is_created().await);
        assert!(engine.network_names().is_empty());
        assert_eq!(engine.call_count("remove_network"), 1);
    }

    #[tokio::test]
    async fn close_tolerates_network_already_gone() {
        let engine = MockEngine::new();
        let network = network(&engine);
        network.create().await.unwrap();

        engine.fail_next("remove_network", EngineError::NotFound("gone".into()));
        network.close(false).await.unwrap();
        assert!(!network.is_created().await);
    }

    #[tokio::test]
    async fn network_with_attached_container_is_in_use() {
        let engine = MockEngine::new();
        let network = network(&engine);
        network.create().await.unwrap();

        let spec = ContainerSpec::new("alpine:latest")
            .with_network(&network)
            .with_network_aliases(["db"]);
        let mut container = DockerContainer::with_engine(spec, Arc::new(engine.clone()))
            .with_environment(HostEnvironment::default());
        container.start().await.unwrap();

        let err = network.close(false).await.unwrap_err();
        assert!(matches!(err, Error::NetworkInUse(_)));
        assert!(network.is_created().await);

        container.stop().await.unwrap();
        container.remove().await.unwrap();
        network.close(false).await.unwrap();
        assert!(!network.is_created().await);
    }

    #[tokio::test]
    async fn unreachable_engine_keeps_network_created() {
        let engine = MockEngine::new();
        let network = network(&engine);
        network.create().await.unwrap();

        engine.fail_next("remove_network", EngineError::Unreachable("down".into()));
        assert!(matches!(
            network.close(false).await,
            Err(Error::Connection(_))
        ));
        assert!(network.is_created().await);
    }

    // ===========================================
    // Shared network
    // ===========================================

    #[tokio::test]
    async fn shared_network_survives_plain_close() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));

        let shared = registry.get_or_create_shared().await.unwrap();
        assert!(shared.is_shared());
        assert_eq!(shared.name(), SHARED_NETWORK_NAME);

        shared.close(false).await.unwrap();
        assert!(shared.is_created().await);

        shared.force_close().await.unwrap();
        assert!(!shared.is_created().await);
        assert!(engine.network_names().is_empty());
        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shared_network_is_created_and_registered_once() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));

        let a = registry.get_or_create_shared().await.unwrap();
        let b = registry.get_or_create_shared().await.unwrap();
        let c = registry.get_or_create_shared().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&b, &c));
        assert_eq!(engine.call_count("create_network"), 1);
        assert_eq!(registry.cleanup_registrations(), 1);
        registry.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_removes_shared_network_once() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        registry.get_or_create_shared().await.unwrap();

        registry.shutdown().await.unwrap();
        registry.shutdown().await.unwrap();
        drop(registry);

        assert!(engine.network_names().is_empty());
        assert_eq!(engine.call_count("remove_network"), 1);
    }

    #[tokio::test]
    async fn failed_shutdown_can_be_retried() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        registry.get_or_create_shared().await.unwrap();

        engine.fail_next("remove_network", EngineError::Conflict("in use".into()));
        let first = registry.shutdown().await;
        assert!(matches!(first, Err(Error::NetworkInUse(ref name)) if name == SHARED_NETWORK_NAME));
        assert_eq!(engine.network_names(), vec![SHARED_NETWORK_NAME.to_string()]);

        registry.shutdown().await.unwrap();
        assert!(engine.network_names().is_empty());
        assert_eq!(engine.call_count("remove_network"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_shutdown_leaves_teardown_to_drop() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        registry.get_or_create_shared().await.unwrap();

        engine.fail_next("remove_network", EngineError::Unreachable("down".into()));
        assert!(matches!(registry.shutdown().await, Err(Error::Connection(_))));

        drop(registry);
        assert!(engine.network_names().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropping_registry_on_multi_thread_runtime_removes_shared_network() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        registry.get_or_create_shared().await.unwrap();
        assert_eq!(engine.network_names(), vec![SHARED_NETWORK_NAME.to_string()]);

        drop(registry);

        assert!(engine.network_names().is_empty());
    }

    #[tokio::test]
    async fn dropping_registry_on_current_thread_runtime_does_not_block() {
        let engine = MockEngine::new();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        registry.get_or_create_shared().await.unwrap();

        drop(registry);

        assert_eq!(engine.network_names(), vec![SHARED_NETWORK_NAME.to_string()]);
        assert_eq!(engine.call_count("remove_network"), 0);
    }

    #[test]
    fn dropping_registry_outside_a_runtime_removes_shared_network() {
        let engine = MockEngine::new();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let registry = SharedNetworkRegistry::new(Arc::new(engine.clone()));
        runtime.block_on(registry.get_or_create_shared()).unwrap();

        drop(registry);

        assert!(engine.network_names().is_empty());
    }

    #[test]
    fn dropping_unused_registry_touches_nothing() {
        let engine = MockEngine::new();
        drop(SharedNetworkRegistry::new(Arc::new(engine.clone())));
        assert!(engine.calls().is_empty());
    }
}
