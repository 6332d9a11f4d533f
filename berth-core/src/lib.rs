//! # berth-core
//!
//! Ephemeral Docker containers and networks for integration tests.
//!
//! A test describes a container with a [`ContainerSpec`], starts it through a
//! [`DockerContainer`] handle, waits until it is ready, asks for its host and
//! mapped ports, and tears it down again.
//!
//! ## Features
//!
//! - **Declarative specs**: ports, env, binds, labels and health checks normalised up front
//! - **Wait strategies**: log patterns, TCP ports, HTTP endpoints, health checks or custom predicates
//! - **Networks**: per-test networks plus one shared network per process
//! - **Engine seam**: Docker through `bollard`, or the in-memory [`MockEngine`] in tests
//!
//! ## Example
//!
//! ```ignore
//! use berth_core::{ContainerSpec, DockerContainer, WaitStrategy};
//!
//! let spec = ContainerSpec::new("redis:7")
//!     .with_exposed_port(6379)?
//!     .with_wait_for(WaitStrategy::logs("Ready to accept connections")?);
//!
//! let mut redis = DockerContainer::new(spec)?;
//! redis.start().await?;
//! let url = format!("redis://{}:{}", redis.host().await?, redis.mapped_port(6379).await?);
//! redis.stop().await?;
//! redis.remove().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
pub mod container;
pub mod engine;
pub mod error;
pub mod network;
pub mod spec;
pub mod wait;

pub use config::{ConfigError, Settings};
pub use connection::{connection, register_client_label, set_endpoint, EndpointSource};
pub use container::{ContainerStatus, DockerContainer, HostEnvironment, LifecycleState};
pub use engine::{
    ContainerLogs, DockerEngine, Engine, EngineError, ExecOutput, ExecRequest, MockEngine,
    PullOptions, RegistryAuth, RemoveOptions,
};
pub use error::{Error, Result};
pub use network::{Network, SharedNetworkRegistry};
pub use spec::{Bind, BindMode, ContainerSpec, HealthCheckOptions, PortSpec, Protocol, ToPortSpec};
pub use wait::{HttpWait, WaitOptions, WaitStrategy};
