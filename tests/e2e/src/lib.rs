//! # berth-e2e
//!
//! End-to-end scenarios against a real Docker daemon.
//!
//! Every scenario is `#[ignore]`d so that `cargo test` stays hermetic. Run them
//! with:
//!
//! ```text
//! RUST_LOG=berth_core=debug cargo test -p berth-e2e -- --ignored
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use berth_core::{ContainerSpec, DockerContainer, Result};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

pub mod scenarios;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("berth_core=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A container name unique to this run.
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Small image used by most scenarios.
pub const ALPINE: &str = "alpine:3.19";

/// Alpine container that sleeps, so exec and copy have something to talk to.
pub fn sleeper() -> ContainerSpec {
    ContainerSpec::new(ALPINE).with_command(["sleep", "300"])
}

/// Stop and remove `container`, logging rather than failing.
pub async fn cleanup(container: &mut DockerContainer) {
    if let Err(e) = teardown(container).await {
        tracing::warn!("Cleanup of {:?} failed: {}", container.id(), e);
    }
}

async fn teardown(container: &mut DockerContainer) -> Result<()> {
    if container.running().await? {
        container.stop_force().await?;
    }
    container.remove().await
}
