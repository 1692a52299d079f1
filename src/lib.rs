//! deckhand: a single-host supervisor for container-packaged extensions.
//!
//! An *extension* is a user-installable unit of functionality shipped as one
//! container image plus stored configuration. deckhand keeps a persisted,
//! ordered list of extensions (the desired state) and periodically reconciles
//! it against the containers actually running on the host, starting anything
//! that is missing. On top of the loop it exposes the usual lifecycle
//! operations: install, uninstall, kill, remove, logs, and point-in-time
//! resource statistics.
//!
//! The container engine is reached through the [`runtime::ContainerRuntime`]
//! trait; [`runtime::DockerRuntime`] is the bollard-backed implementation.
//! Desired state is persisted through [`settings::SettingsStore`].

pub mod config;
pub mod manifest;
pub mod runtime;
pub mod settings;
pub mod supervisor;
pub mod testing;

pub use config::Config;
pub use manifest::ManifestFetcher;
pub use runtime::{ContainerRuntime, ContainerSummary, DockerRuntime, StatsSample};
pub use settings::{ExtensionSettings, JsonFileStore, SettingsStore};
pub use supervisor::{
    ContainerStats, Extension, ExtensionSupervisor, MemoryUsage, SupervisorError,
};
