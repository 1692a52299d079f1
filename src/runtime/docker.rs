//! Docker-backed [`ContainerRuntime`] implementation using bollard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, KillContainerOptions, ListContainersOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, StatsOptions,
};
use bollard::image::{CreateImageOptions, RemoveImageOptions};
use futures::StreamExt;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::runtime::error::{Result, RuntimeError};
use crate::runtime::{ContainerRuntime, ContainerSummary, PullProgress, StatsSample};

fn api_err(e: bollard::errors::Error) -> RuntimeError {
    RuntimeError::Api {
        reason: e.to_string(),
    }
}

/// Strip the leading `/` the engine prepends to container names.
fn normalize_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

/// Container runtime backed by a local Docker daemon.
///
/// The connection is shared and lazily initialized: the first call that needs
/// the engine connects and pings it, under a write lock so concurrent first
/// callers initialize exactly once. There is nothing to tear down on stop;
/// the handle is dropped with the process.
pub struct DockerRuntime {
    docker: RwLock<Option<Docker>>,
    connected: AtomicBool,
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            docker: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    /// Whether the engine is reachable right now.
    pub async fn is_available(&self) -> bool {
        self.handle().await.is_ok()
    }

    async fn handle(&self) -> Result<Docker> {
        if self.connected.load(Ordering::SeqCst) {
            if let Some(docker) = self.docker.read().await.as_ref() {
                return Ok(docker.clone());
            }
        }

        let mut guard = self.docker.write().await;
        // Another caller may have won the race while we waited for the lock.
        if let Some(docker) = guard.as_ref() {
            return Ok(docker.clone());
        }

        let docker =
            Docker::connect_with_local_defaults().map_err(|e| RuntimeError::Unreachable {
                reason: e.to_string(),
            })?;
        docker.ping().await.map_err(|e| RuntimeError::Unreachable {
            reason: e.to_string(),
        })?;

        *guard = Some(docker.clone());
        self.connected.store(true, Ordering::SeqCst);
        tracing::debug!("connected to container engine");
        Ok(docker)
    }

    async fn list_with_filters(
        &self,
        filters: HashMap<String, Vec<String>>,
    ) -> Result<Vec<ContainerSummary>> {
        let docker = self.handle().await?;
        let containers = docker
            .list_containers(Some(ListContainersOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(api_err)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let name = c
                    .names
                    .as_ref()
                    .and_then(|names| names.first())
                    .map(|n| normalize_name(n).to_string())?;
                Some(ContainerSummary {
                    name,
                    image: c.image.unwrap_or_default(),
                })
            })
            .collect())
    }
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list_running(&self) -> Result<Vec<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("status".to_string(), vec!["running".to_string()]);
        self.list_with_filters(filters).await
    }

    async fn find_container(&self, name: &str) -> Result<Option<ContainerSummary>> {
        let mut filters = HashMap::new();
        filters.insert("name".to_string(), vec![name.to_string()]);
        // The engine's name filter matches substrings; narrow to an exact hit.
        let containers = self.list_with_filters(filters).await?;
        Ok(containers.into_iter().find(|c| c.name == name))
    }

    async fn create_container(&self, name: &str, config: serde_json::Value) -> Result<()> {
        let docker = self.handle().await?;

        let config: Config<String> =
            serde_json::from_value(config).map_err(|e| RuntimeError::InvalidConfig {
                reason: e.to_string(),
            })?;

        // Replace semantics: drop any same-named container from a previous
        // run before creating. Absence is not an error.
        let _ = docker
            .remove_container(
                name,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        docker
            .create_container(
                Some(CreateContainerOptions {
                    name: name.to_string(),
                    ..Default::default()
                }),
                config,
            )
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn start_container(&self, name: &str) -> Result<()> {
        let docker = self.handle().await?;
        docker
            .start_container(name, None::<StartContainerOptions<String>>)
            .await
            .map_err(api_err)
    }

    async fn kill_container(&self, name: &str) -> Result<()> {
        let docker = self.handle().await?;
        docker
            .kill_container(name, None::<KillContainerOptions<String>>)
            .await
            .map_err(api_err)
    }

    async fn remove_container(&self, name: &str) -> Result<()> {
        let docker = self.handle().await?;
        docker
            .remove_container(name, None::<RemoveContainerOptions>)
            .await
            .map_err(api_err)
    }

    async fn pull_image(&self, image: &str) -> Result<()> {
        let docker = self.handle().await?;
        let mut stream = docker.create_image(
            Some(CreateImageOptions {
                from_image: image.to_string(),
                ..Default::default()
            }),
            None,
            None,
        );

        while let Some(progress) = stream.next().await {
            let info = progress.map_err(api_err)?;
            if let Some(status) = info.status {
                tracing::trace!(image, "pull: {status}");
            }
        }
        Ok(())
    }

    async fn pull_image_progress(&self, image: &str) -> Result<PullProgress> {
        let docker = self.handle().await?;
        let image = image.to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        // The pull is driven by a task of its own so an abandoned consumer
        // does not abort the engine-side pull mid-flight.
        tokio::spawn(async move {
            let mut stream = docker.create_image(
                Some(CreateImageOptions {
                    from_image: image.clone(),
                    ..Default::default()
                }),
                None,
                None,
            );

            while let Some(progress) = stream.next().await {
                let line = progress.map_err(api_err).and_then(|info| {
                    serde_json::to_string(&info).map_err(|e| RuntimeError::Api {
                        reason: e.to_string(),
                    })
                });
                let failed = line.is_err();
                // A dropped receiver just means nobody is watching.
                let _ = tx.send(line);
                if failed {
                    break;
                }
            }
        });

        Ok(UnboundedReceiverStream::new(rx).boxed())
    }

    async fn remove_image(&self, image: &str) -> Result<()> {
        let docker = self.handle().await?;
        docker
            .remove_image(
                image,
                Some(RemoveImageOptions {
                    force: false,
                    noprune: false,
                }),
                None,
            )
            .await
            .map_err(api_err)?;
        Ok(())
    }

    async fn sample_stats(&self) -> Result<Vec<StatsSample>> {
        let docker = self.handle().await?;
        let containers = docker
            .list_containers(None::<ListContainersOptions<String>>)
            .await
            .map_err(api_err)?;

        let mut samples = Vec::with_capacity(containers.len());
        for container in containers {
            let Some(name) = container.names.as_ref().and_then(|n| n.first()).cloned() else {
                continue;
            };
            let mut stream = docker.stats(
                normalize_name(&name),
                Some(StatsOptions {
                    stream: false,
                    one_shot: false,
                }),
            );
            let Some(stats) = stream.next().await else {
                continue;
            };
            let stats = stats.map_err(api_err)?;

            samples.push(StatsSample {
                name: stats.name,
                cpu_total: stats.cpu_stats.cpu_usage.total_usage,
                precpu_total: stats.precpu_stats.cpu_usage.total_usage,
                system_cpu: stats.cpu_stats.system_cpu_usage,
                presystem_cpu: stats.precpu_stats.system_cpu_usage,
                memory_usage: stats.memory_stats.usage,
                memory_limit: stats.memory_stats.limit,
            });
        }
        Ok(samples)
    }

    async fn container_logs(&self, name: &str) -> Result<Vec<String>> {
        let docker = self.handle().await?;
        let mut stream = docker.logs(
            name,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut lines = Vec::new();
        while let Some(output) = stream.next().await {
            let output: LogOutput = output.map_err(api_err)?;
            let chunk = String::from_utf8_lossy(&output.into_bytes()).into_owned();
            lines.extend(
                chunk
                    .split('\n')
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            );
        }
        Ok(lines)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_single_leading_slash() {
        assert_eq!(normalize_name("/extension-foo"), "extension-foo");
        assert_eq!(normalize_name("extension-foo"), "extension-foo");
    }

    #[test]
    fn permissions_blob_deserializes_into_engine_config() {
        let blob = serde_json::json!({
            "Image": "sidecar:v1",
            "Env": ["MODE=prod"],
            "HostConfig": {
                "Binds": ["/var/data:/data:rw"],
                "NetworkMode": "host"
            }
        });
        let config: Config<String> = serde_json::from_value(blob).unwrap();
        assert_eq!(config.image.as_deref(), Some("sidecar:v1"));
        let host = config.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("host"));
        assert_eq!(host.binds.unwrap(), vec!["/var/data:/data:rw".to_string()]);
    }
}
