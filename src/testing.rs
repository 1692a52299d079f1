//! In-memory collaborators for exercising the supervisor without an engine.
//!
//! [`MockRuntime`] implements [`ContainerRuntime`] over plain collections and
//! counts lifecycle calls; [`MemorySettingsStore`] implements
//! [`SettingsStore`] without touching the filesystem.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;

use crate::runtime::{
    ContainerRuntime, ContainerSummary, PullProgress, Result as RuntimeResult, RuntimeError,
    StatsSample,
};
use crate::settings::{ExtensionSettings, Result as SettingsResult, SettingsStore};
use crate::supervisor::Extension;

/// Fake container engine with observable state.
///
/// Created containers become "running" on start and leave the running set on
/// kill or remove, so successive reconciliation passes see their own effects.
#[derive(Default)]
pub struct MockRuntime {
    running: Mutex<Vec<ContainerSummary>>,
    created: Mutex<HashMap<String, String>>,
    samples: Mutex<Vec<StatsSample>>,
    logs: Mutex<HashMap<String, Vec<String>>>,
    pull_events: Mutex<Vec<String>>,
    /// Simulate an offline engine for image pulls.
    pub fail_pulls: AtomicBool,
    /// Simulate an unreachable engine for container listing.
    pub fail_listing: AtomicBool,
    /// Number of container starts issued.
    pub start_calls: AtomicU32,
    /// Number of blocking pulls issued.
    pub pull_calls: AtomicU32,
    /// Number of streamed pulls issued.
    pub stream_pull_calls: AtomicU32,
    /// Number of kill signals sent.
    pub kill_calls: AtomicU32,
    removed_images: Mutex<Vec<String>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a container as already running.
    pub fn add_running(&self, name: &str, image: &str) {
        self.running.lock().unwrap().push(ContainerSummary {
            name: name.to_string(),
            image: image.to_string(),
        });
    }

    /// Queue a line for the next streamed pull.
    pub fn push_pull_event(&self, line: &str) {
        self.pull_events.lock().unwrap().push(line.to_string());
    }

    /// Set the samples returned by [`ContainerRuntime::sample_stats`].
    pub fn set_samples(&self, samples: Vec<StatsSample>) {
        *self.samples.lock().unwrap() = samples;
    }

    /// Set the log lines returned for a container.
    pub fn set_logs(&self, name: &str, lines: Vec<String>) {
        self.logs.lock().unwrap().insert(name.to_string(), lines);
    }

    /// Containers created so far, as `(name, image)` pairs in creation order.
    pub fn created_images(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .created
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        pairs.sort();
        pairs
    }

    /// Images deleted so far.
    pub fn removed_images(&self) -> Vec<String> {
        self.removed_images.lock().unwrap().clone()
    }

    fn unreachable() -> RuntimeError {
        RuntimeError::Unreachable {
            reason: "mock engine offline".to_string(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn list_running(&self) -> RuntimeResult<Vec<ContainerSummary>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(self.running.lock().unwrap().clone())
    }

    async fn find_container(&self, name: &str) -> RuntimeResult<Option<ContainerSummary>> {
        Ok(self
            .running
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.name == name)
            .cloned())
    }

    async fn create_container(
        &self,
        name: &str,
        config: serde_json::Value,
    ) -> RuntimeResult<()> {
        let image = config["Image"]
            .as_str()
            .ok_or_else(|| RuntimeError::InvalidConfig {
                reason: "missing Image".to_string(),
            })?
            .to_string();
        // Replace semantics.
        self.running.lock().unwrap().retain(|c| c.name != name);
        self.created.lock().unwrap().insert(name.to_string(), image);
        Ok(())
    }

    async fn start_container(&self, name: &str) -> RuntimeResult<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let image = self
            .created
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::Api {
                reason: format!("container '{name}' was never created"),
            })?;
        self.add_running(name, &image);
        Ok(())
    }

    async fn kill_container(&self, name: &str) -> RuntimeResult<()> {
        self.kill_calls.fetch_add(1, Ordering::SeqCst);
        self.running.lock().unwrap().retain(|c| c.name != name);
        Ok(())
    }

    async fn remove_container(&self, name: &str) -> RuntimeResult<()> {
        self.running.lock().unwrap().retain(|c| c.name != name);
        self.created.lock().unwrap().remove(name);
        Ok(())
    }

    async fn pull_image(&self, _image: &str) -> RuntimeResult<()> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        Ok(())
    }

    async fn pull_image_progress(&self, _image: &str) -> RuntimeResult<PullProgress> {
        self.stream_pull_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(Self::unreachable());
        }
        let events: Vec<RuntimeResult<String>> = self
            .pull_events
            .lock()
            .unwrap()
            .iter()
            .cloned()
            .map(Ok)
            .collect();
        Ok(stream::iter(events).boxed())
    }

    async fn remove_image(&self, image: &str) -> RuntimeResult<()> {
        self.removed_images.lock().unwrap().push(image.to_string());
        Ok(())
    }

    async fn sample_stats(&self) -> RuntimeResult<Vec<StatsSample>> {
        Ok(self.samples.lock().unwrap().clone())
    }

    async fn container_logs(&self, name: &str) -> RuntimeResult<Vec<String>> {
        Ok(self
            .logs
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .unwrap_or_default())
    }
}

/// Settings store over an in-memory document, with a save counter.
#[derive(Default)]
pub struct MemorySettingsStore {
    document: Mutex<ExtensionSettings>,
    /// Number of saves performed.
    pub save_calls: AtomicU32,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start out with the given extensions already installed.
    pub fn with_extensions(extensions: Vec<Extension>) -> Self {
        Self {
            document: Mutex::new(ExtensionSettings {
                extensions,
                ..ExtensionSettings::default()
            }),
            save_calls: AtomicU32::new(0),
        }
    }

    /// The currently persisted document.
    pub fn persisted(&self) -> ExtensionSettings {
        self.document.lock().unwrap().clone()
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self) -> SettingsResult<ExtensionSettings> {
        Ok(self.document.lock().unwrap().clone())
    }

    async fn save(&self, settings: &ExtensionSettings) -> SettingsResult<()> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        *self.document.lock().unwrap() = settings.clone();
        Ok(())
    }
}
