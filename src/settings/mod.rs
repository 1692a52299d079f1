//! Persistence for the desired extension list.
//!
//! The settings document is a whole-object overwrite: every mutation saves
//! the full list. [`JsonFileStore`] keeps it in a JSON file and makes the
//! save atomic by writing a sibling temp file and renaming it into place.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::supervisor::Extension;

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

/// Errors that can occur loading or saving settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read or written.
    #[error("settings I/O failed at '{path}': {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file exists but does not parse.
    #[error("settings file '{path}' is corrupt: {reason}")]
    Corrupt {
        /// Path involved.
        path: PathBuf,
        /// Parse failure.
        reason: String,
    },
}

/// The persisted settings document: an ordered list of extensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExtensionSettings {
    /// Document format version.
    pub version: u32,
    /// Desired extension list, in install order.
    pub extensions: Vec<Extension>,
}

impl Default for ExtensionSettings {
    fn default() -> Self {
        Self {
            version: 1,
            extensions: Vec::new(),
        }
    }
}

/// Storage boundary for [`ExtensionSettings`].
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Load the settings document, or defaults if none has been saved yet.
    async fn load(&self) -> Result<ExtensionSettings>;

    /// Persist the settings document, replacing whatever was stored.
    async fn save(&self, settings: &ExtensionSettings) -> Result<()>;
}

/// JSON-file-backed settings store with atomic saves.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> SettingsError {
        SettingsError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl SettingsStore for JsonFileStore {
    async fn load(&self) -> Result<ExtensionSettings> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ExtensionSettings::default());
            }
            Err(e) => return Err(self.io_err(e)),
        };

        serde_json::from_slice(&bytes).map_err(|e| SettingsError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }

    async fn save(&self, settings: &ExtensionSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_err(e))?;
        }

        let json = serde_json::to_vec_pretty(settings).map_err(|e| SettingsError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        // Write-then-rename so a crash mid-save never truncates the document.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_err(e))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn sample() -> ExtensionSettings {
        ExtensionSettings {
            version: 1,
            extensions: vec![Extension {
                identifier: "acme/sidecar".to_string(),
                name: "sidecar".to_string(),
                tag: "v1".to_string(),
                permissions: serde_json::json!({"HostConfig": {"NetworkMode": "host"}}),
                enabled: true,
            }],
        }
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("extensions.json"));

        store.save(&sample()).await.unwrap();
        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, sample());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nowhere").join("extensions.json"));

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, ExtensionSettings::default());
    }

    #[tokio::test]
    async fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("a").join("b").join("extensions.json"));

        store.save(&sample()).await.unwrap();
        assert!(store.path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_not_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extensions.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();

        let store = JsonFileStore::new(&path);
        let err = store.load().await.unwrap_err();
        assert!(matches!(err, SettingsError::Corrupt { .. }));
    }
}
