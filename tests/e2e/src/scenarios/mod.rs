//! Docker-backed scenarios, grouped by component.
//!
//! - `container` - lifecycle, ports, waits, exec, file copy
//! - `network` - per-test and shared networks
//! - `presets` - service presets against real images

pub mod container;
pub mod network;
pub mod presets;
