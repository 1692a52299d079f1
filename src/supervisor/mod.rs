//! Extension supervision: reconciliation loop and lifecycle operations.

mod error;
mod extension;
mod manager;
mod stats;

pub use error::{Result, SupervisorError};
pub use extension::{CONTAINER_PREFIX, Extension, expected_container_name};
pub use manager::ExtensionSupervisor;
pub use stats::{ContainerStats, MemoryUsage, translate};
