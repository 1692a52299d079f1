//! The extension supervisor: reconciliation loop and lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use tokio::sync::RwLock;

use crate::config::Config;
use crate::manifest::ManifestFetcher;
use crate::runtime::{ContainerRuntime, ContainerSummary, PullProgress};
use crate::settings::{ExtensionSettings, SettingsStore};
use crate::supervisor::error::{Result, SupervisorError};
use crate::supervisor::extension::{Extension, expected_container_name};
use crate::supervisor::stats::{ContainerStats, translate};

/// Supervises the desired extension list against the containers actually
/// running on the host.
///
/// Sole writer of desired-state changes: install and uninstall mutate the
/// list here and persist through the settings store before driving the
/// engine. The reconciliation loop and externally triggered operations share
/// one cooperative schedule and interleave only at await points; the
/// create-or-replace semantics at the engine boundary absorb the remaining
/// install/tick race.
pub struct ExtensionSupervisor {
    runtime: Arc<dyn ContainerRuntime>,
    store: Arc<dyn SettingsStore>,
    manifest: ManifestFetcher,
    settings: RwLock<ExtensionSettings>,
    observed: RwLock<Vec<ContainerSummary>>,
    should_run: AtomicBool,
    tick_interval: Duration,
}

impl ExtensionSupervisor {
    /// Build a supervisor, loading the persisted desired state.
    pub async fn new(
        runtime: Arc<dyn ContainerRuntime>,
        store: Arc<dyn SettingsStore>,
        config: &Config,
    ) -> Result<Self> {
        let settings = store.load().await?;
        Ok(Self {
            runtime,
            store,
            manifest: ManifestFetcher::new(config.manifest_url.clone()),
            settings: RwLock::new(settings),
            observed: RwLock::new(Vec::new()),
            should_run: AtomicBool::new(true),
            tick_interval: config.tick_interval,
        })
    }

    /// Run the reconciliation loop until [`stop`](Self::stop) is called.
    ///
    /// Deliberately serial: extensions are checked in desired-list order, one
    /// at a time, with no per-extension timeout. The list is expected to be
    /// short and pulls are rare after the first one, and serializing the pass
    /// is what keeps install's append-then-persist safe without locks. A
    /// failed tick is logged and retried on the next interval; the stop flag
    /// is observed only at the tick boundary, so stopping takes up to one
    /// interval and never interrupts a pass in progress.
    pub async fn run(&self) {
        tracing::info!(interval = ?self.tick_interval, "reconciliation loop started");
        loop {
            tokio::time::sleep(self.tick_interval).await;
            if !self.should_run.load(Ordering::SeqCst) {
                break;
            }
            if let Err(e) = self.tick().await {
                tracing::warn!(error = %e, "reconciliation tick failed, retrying next interval");
            }
        }
        tracing::info!("reconciliation loop stopped");
    }

    /// Request the loop to stop at the next tick boundary. In-flight work is
    /// not cancelled.
    pub fn stop(&self) {
        self.should_run.store(false, Ordering::SeqCst);
    }

    /// One reconciliation pass: refresh the observed snapshot, then start
    /// every desired extension with no matching running container.
    ///
    /// Every desired record is checked regardless of its `enabled` flag.
    /// That means a disabled extension is still auto-started, which the
    /// field's name does not suggest; kept as-is for compatibility with
    /// existing deployments until scheduling semantics for `enabled` are
    /// settled.
    pub async fn tick(&self) -> Result<()> {
        let running = self.runtime.list_running().await?;
        *self.observed.write().await = running;

        let desired = self.settings.read().await.extensions.clone();
        for extension in &desired {
            self.check(extension).await?;
        }
        Ok(())
    }

    async fn check(&self, extension: &Extension) -> Result<()> {
        let container_name = extension.container_name();
        let running = self
            .observed
            .read()
            .await
            .iter()
            .any(|c| c.name == container_name);
        if !running {
            self.start_extension(extension).await?;
        }
        Ok(())
    }

    /// Pull (best effort), create-or-replace, and start one extension.
    ///
    /// A pull failure is tolerated: the host may be offline and a locally
    /// cached image may still exist. If it does not, container creation fails
    /// and that error is surfaced. No rollback after a late failure; the next
    /// tick observes the container missing and retries.
    pub async fn start_extension(&self, extension: &Extension) -> Result<()> {
        tracing::info!("starting extension '{}'", extension.fullname());

        if let Err(e) = self.runtime.pull_image(&extension.fullname()).await {
            tracing::info!(
                error = %e,
                "unable to pull a new image, attempting to continue with a local one"
            );
        }

        let container_name = extension.container_name();
        self.runtime
            .create_container(&container_name, extension.container_config())
            .await?;
        self.runtime.start_container(&container_name).await?;
        Ok(())
    }

    /// Install an extension: append it to the desired list, persist, and
    /// return the image-pull progress stream.
    ///
    /// Idempotent by design: if an extension with the same name is already
    /// installed, nothing changes and the returned stream is empty. The
    /// record is persisted before the pull begins, so a crash mid-pull
    /// leaves a durable entry the next tick repairs. The stream is one-shot;
    /// abandoning it does not cancel the engine-side pull. No container is
    /// started here; the next reconciliation tick brings the extension up.
    pub async fn install_extension(&self, extension: Extension) -> Result<PullProgress> {
        let image = extension.fullname();
        {
            let mut settings = self.settings.write().await;
            if settings
                .extensions
                .iter()
                .any(|installed| installed.name == extension.name)
            {
                tracing::debug!("extension '{}' already installed", extension.name);
                return Ok(stream::empty().boxed());
            }
            settings.extensions.push(extension);
            self.store.save(&settings).await?;
        }

        Ok(self.runtime.pull_image_progress(&image).await?)
    }

    /// Uninstall an extension by name.
    ///
    /// The name is normalized into its container-name-prefix form and matched
    /// against the desired list by prefix, tolerating suffix drift in stored
    /// names. Removes the live container and its image, then drops the record
    /// and persists. If the container is gone but the record survived an
    /// earlier partial failure, this fails at container lookup, a known gap
    /// not compensated here.
    pub async fn uninstall_extension(&self, extension_name: &str) -> Result<()> {
        let expected = expected_container_name(extension_name);
        let container_name = self
            .settings
            .read()
            .await
            .extensions
            .iter()
            .find(|e| e.container_name().starts_with(&expected))
            .map(|e| e.container_name())
            .ok_or_else(|| SupervisorError::ExtensionNotFound {
                name: extension_name.to_string(),
            })?;

        tracing::info!("uninstalling extension '{extension_name}' ({container_name})");
        self.remove(&container_name).await?;

        let mut settings = self.settings.write().await;
        settings.extensions.retain(|e| e.name != extension_name);
        self.store.save(&settings).await?;
        Ok(())
    }

    /// Kill a container by exact name. A missing container is a no-op.
    pub async fn kill(&self, container_name: &str) -> Result<()> {
        tracing::info!("killing {container_name}");
        if self.runtime.find_container(container_name).await?.is_some() {
            self.runtime.kill_container(container_name).await?;
        }
        Ok(())
    }

    /// Kill and delete a container and its backing image (non-forced image
    /// removal; an image still referenced elsewhere fails per engine
    /// semantics).
    pub async fn remove(&self, container_name: &str) -> Result<()> {
        tracing::info!("removing container {container_name}");
        let container = self
            .runtime
            .find_container(container_name)
            .await?
            .ok_or_else(|| SupervisorError::ContainerDoesNotExist {
                name: container_name.to_string(),
            })?;

        self.kill(container_name).await?;
        self.runtime.remove_container(container_name).await?;
        self.runtime.remove_image(&container.image).await?;
        Ok(())
    }

    /// Fresh snapshot of running containers, bypassing the tick cache.
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>> {
        Ok(self.runtime.list_running().await?)
    }

    /// Current desired extension list.
    pub async fn installed_extensions(&self) -> Vec<Extension> {
        self.settings.read().await.extensions.clone()
    }

    /// Combined stdout/stderr log of a container.
    pub async fn load_logs(&self, container_name: &str) -> Result<Vec<String>> {
        if self.runtime.find_container(container_name).await?.is_none() {
            return Err(SupervisorError::ContainerDoesNotExist {
                name: container_name.to_string(),
            });
        }
        Ok(self.runtime.container_logs(container_name).await?)
    }

    /// Point-in-time stats for every container the engine knows, keyed by
    /// normalized container name. Nothing is retained between calls.
    pub async fn load_stats(&self) -> Result<HashMap<String, ContainerStats>> {
        let samples = self.runtime.sample_stats().await?;
        Ok(samples
            .iter()
            .map(|sample| {
                let name = sample.name.trim_start_matches('/').to_string();
                (name, translate(sample))
            })
            .collect())
    }

    /// Fetch the remote extension catalog.
    pub async fn fetch_manifest(&self) -> Result<serde_json::Value> {
        Ok(self.manifest.fetch().await?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::runtime::RuntimeError;
    use crate::testing::{MemorySettingsStore, MockRuntime};

    fn ext(name: &str, tag: &str) -> Extension {
        Extension {
            identifier: format!("acme/{name}"),
            name: name.to_string(),
            tag: tag.to_string(),
            permissions: serde_json::Value::Null,
            enabled: true,
        }
    }

    async fn supervisor_with(
        extensions: Vec<Extension>,
    ) -> (ExtensionSupervisor, Arc<MockRuntime>, Arc<MemorySettingsStore>) {
        let runtime = Arc::new(MockRuntime::new());
        let store = Arc::new(MemorySettingsStore::with_extensions(extensions));
        let supervisor = ExtensionSupervisor::new(
            runtime.clone(),
            store.clone(),
            &Config::default(),
        )
        .await
        .unwrap();
        (supervisor, runtime, store)
    }

    #[tokio::test]
    async fn tick_starts_one_missing_extension() {
        let (supervisor, runtime, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;

        supervisor.tick().await.unwrap();

        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            runtime.created_images(),
            vec![("extension-sidecar".to_string(), "sidecar:v1".to_string())]
        );
    }

    #[tokio::test]
    async fn reconciliation_is_idempotent() {
        let (supervisor, runtime, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;

        supervisor.tick().await.unwrap();
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);

        // The container now shows up as running; a second pass issues nothing.
        supervisor.tick().await.unwrap();
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_extensions_are_still_started() {
        let mut disabled = ext("sidecar", "v1");
        disabled.enabled = false;
        let (supervisor, runtime, _) = supervisor_with(vec![disabled]).await;

        supervisor.tick().await.unwrap();
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn tick_aborts_when_engine_is_unreachable() {
        let (supervisor, runtime, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;
        runtime.fail_listing.store(true, Ordering::SeqCst);

        let err = supervisor.tick().await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::Runtime(RuntimeError::Unreachable { .. })
        ));
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn start_extension_tolerates_offline_pull() {
        let (supervisor, runtime, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;
        runtime.fail_pulls.store(true, Ordering::SeqCst);

        // Pull fails but creation proceeds against the local image.
        supervisor.tick().await.unwrap();
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn install_appends_persists_and_streams() {
        let (supervisor, runtime, store) = supervisor_with(Vec::new()).await;
        runtime.push_pull_event(r#"{"status":"Pulling from acme/sidecar"}"#);

        let mut progress = supervisor.install_extension(ext("sidecar", "v1")).await.unwrap();
        let first = progress.next().await.unwrap().unwrap();
        assert!(first.contains("Pulling"));

        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
        let installed = supervisor.installed_extensions().await;
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].name, "sidecar");
        // Install never starts the container itself.
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_install_is_a_silent_noop() {
        let (supervisor, runtime, store) = supervisor_with(vec![ext("sidecar", "v1")]).await;

        let mut progress = supervisor.install_extension(ext("sidecar", "v2")).await.unwrap();
        assert!(progress.next().await.is_none());

        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
        assert_eq!(runtime.stream_pull_calls.load(Ordering::SeqCst), 0);
        let installed = supervisor.installed_extensions().await;
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].tag, "v1");
    }

    #[tokio::test]
    async fn uninstall_unknown_extension_fails() {
        let (supervisor, _, store) = supervisor_with(vec![ext("sidecar", "v1")]).await;

        let err = supervisor.uninstall_extension("ghost").await.unwrap_err();
        assert!(matches!(err, SupervisorError::ExtensionNotFound { .. }));
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn uninstall_removes_exactly_one_record_in_order() {
        let (supervisor, runtime, store) =
            supervisor_with(vec![ext("alpha", "v1"), ext("beta", "v1"), ext("gamma", "v1")]).await;

        // Bring everything up so the uninstall finds its container.
        supervisor.tick().await.unwrap();

        supervisor.uninstall_extension("beta").await.unwrap();

        let names: Vec<String> = supervisor
            .installed_extensions()
            .await
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["alpha".to_string(), "gamma".to_string()]);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(runtime.removed_images(), vec!["beta:v1".to_string()]);
    }

    #[tokio::test]
    async fn uninstall_matches_by_container_name_prefix() {
        // "side.car" and "sidecar" normalize to the same container name; the
        // prefix match tolerates that drift.
        let (supervisor, _, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;
        supervisor.tick().await.unwrap();

        supervisor.uninstall_extension("side.car").await.unwrap();
        // The record is dropped by raw-name equality, so the drifted spelling
        // leaves the list untouched, matching the source behavior.
        assert_eq!(supervisor.installed_extensions().await.len(), 1);
    }

    #[tokio::test]
    async fn uninstall_fails_when_container_is_not_running() {
        let (supervisor, _, store) = supervisor_with(vec![ext("sidecar", "v1")]).await;

        // Never ticked: the container was never started.
        let err = supervisor.uninstall_extension("sidecar").await.unwrap_err();
        assert!(matches!(err, SupervisorError::ContainerDoesNotExist { .. }));
        assert_eq!(supervisor.installed_extensions().await.len(), 1);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn kill_missing_container_is_a_noop() {
        let (supervisor, runtime, _) = supervisor_with(Vec::new()).await;

        supervisor.kill("extension-ghost").await.unwrap();
        assert_eq!(runtime.kill_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn remove_missing_container_fails_and_desired_state_is_untouched() {
        let (supervisor, _, store) = supervisor_with(vec![ext("foo", "v1")]).await;

        let err = supervisor.remove("extension-foo").await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::ContainerDoesNotExist { ref name } if name == "extension-foo"
        ));
        assert_eq!(supervisor.installed_extensions().await.len(), 1);
        assert_eq!(store.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn logs_require_an_existing_container() {
        let (supervisor, runtime, _) = supervisor_with(vec![ext("sidecar", "v1")]).await;
        supervisor.tick().await.unwrap();
        runtime.set_logs("extension-sidecar", vec!["ready".to_string()]);

        let lines = supervisor.load_logs("extension-sidecar").await.unwrap();
        assert_eq!(lines, vec!["ready".to_string()]);

        let err = supervisor.load_logs("extension-ghost").await.unwrap_err();
        assert!(matches!(err, SupervisorError::ContainerDoesNotExist { .. }));
    }

    #[tokio::test]
    async fn load_stats_maps_normalized_names() {
        use crate::runtime::StatsSample;
        use crate::supervisor::MemoryUsage;

        let (supervisor, runtime, _) = supervisor_with(Vec::new()).await;
        runtime.set_samples(vec![StatsSample {
            name: "/extension-sidecar".to_string(),
            cpu_total: 150,
            precpu_total: 100,
            system_cpu: Some(1200),
            presystem_cpu: Some(1000),
            memory_usage: None,
            memory_limit: Some(1024),
        }]);

        let stats = supervisor.load_stats().await.unwrap();
        let sidecar = &stats["extension-sidecar"];
        assert_eq!(sidecar.cpu, 25.0);
        assert_eq!(sidecar.memory, MemoryUsage::Unavailable);
    }

    #[tokio::test]
    async fn stop_is_observed_at_the_tick_boundary() {
        let runtime = Arc::new(MockRuntime::new());
        let store = Arc::new(MemorySettingsStore::with_extensions(vec![ext(
            "sidecar", "v1",
        )]));
        let config = Config {
            tick_interval: Duration::from_millis(10),
            ..Config::default()
        };
        let supervisor = Arc::new(
            ExtensionSupervisor::new(runtime.clone(), store, &config)
                .await
                .unwrap(),
        );

        // Stop before spawning: the flag is read after the first sleep, so
        // the loop exits without ever running a tick.
        supervisor.stop();
        let looper = supervisor.clone();
        let handle = tokio::spawn(async move { looper.run().await });

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop did not stop")
            .unwrap();
        assert_eq!(runtime.start_calls.load(Ordering::SeqCst), 0);
    }
}
