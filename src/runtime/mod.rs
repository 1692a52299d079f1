//! Container engine boundary.
//!
//! Everything the supervisor needs from the engine goes through the
//! [`ContainerRuntime`] trait: container lifecycle, image pulls (blocking and
//! streamed), one-shot resource samples, and logs. [`DockerRuntime`] is the
//! bollard-backed implementation; tests use the mock in [`crate::testing`].

mod docker;
mod error;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub use docker::DockerRuntime;
pub use error::{Result, RuntimeError};

/// One running container as observed from the engine.
///
/// `name` is normalized: the engine's leading `/` is stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Primary container name.
    pub name: String,
    /// Image reference the container was created from.
    pub image: String,
}

/// One non-streaming resource-usage sample for a container.
///
/// Carries the current and immediately preceding accounting period so a rate
/// can be derived without daemon-side history. Fields the engine may omit
/// (system CPU counters on some platforms, memory accounting in unlimited
/// cgroups) are optional.
#[derive(Debug, Clone, Default)]
pub struct StatsSample {
    /// Container name as reported by the engine (may carry a leading `/`).
    pub name: String,
    /// Cumulative CPU usage of the container, current period.
    pub cpu_total: u64,
    /// Cumulative CPU usage of the container, previous period.
    pub precpu_total: u64,
    /// Cumulative system-wide CPU usage, current period.
    pub system_cpu: Option<u64>,
    /// Cumulative system-wide CPU usage, previous period.
    pub presystem_cpu: Option<u64>,
    /// Current memory usage in bytes.
    pub memory_usage: Option<u64>,
    /// Memory limit in bytes.
    pub memory_limit: Option<u64>,
}

/// Stream of serialized image-pull progress lines.
///
/// Lazy and one-shot: the pull is issued when the stream is first polled and
/// cannot be restarted. Dropping the stream abandons consumption only; the
/// engine continues the pull on its side.
pub type PullProgress = BoxStream<'static, Result<String>>;

/// Abstraction over the container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// List containers currently in the `running` state.
    async fn list_running(&self) -> Result<Vec<ContainerSummary>>;

    /// Look up a container by exact name, running or not.
    async fn find_container(&self, name: &str) -> Result<Option<ContainerSummary>>;

    /// Create a container under `name`, replacing any existing container with
    /// the same name. `config` is the engine-level create payload (image plus
    /// the extension's opaque permissions blob).
    async fn create_container(&self, name: &str, config: serde_json::Value) -> Result<()>;

    /// Start a created container.
    async fn start_container(&self, name: &str) -> Result<()>;

    /// Send a kill signal to a running container.
    async fn kill_container(&self, name: &str) -> Result<()>;

    /// Delete a container.
    async fn remove_container(&self, name: &str) -> Result<()>;

    /// Pull an image, draining progress internally.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Pull an image, exposing progress as a stream of serialized status
    /// lines.
    async fn pull_image_progress(&self, image: &str) -> Result<PullProgress>;

    /// Delete an image. Non-forced: fails if the image is still referenced.
    async fn remove_image(&self, image: &str) -> Result<()>;

    /// Fetch one two-period resource sample for every container known to the
    /// engine.
    async fn sample_stats(&self) -> Result<Vec<StatsSample>>;

    /// Fetch the combined stdout/stderr log of a container as lines.
    async fn container_logs(&self, name: &str) -> Result<Vec<String>>;
}
