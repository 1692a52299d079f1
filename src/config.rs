//! Process configuration, read from `DECKHAND_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Default extension catalog URL.
pub const DEFAULT_MANIFEST_URL: &str =
    "https://deckhand-extensions.github.io/deckhand-extensions-repository/manifest.json";

/// Default reconciliation tick interval.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Errors reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric variable did not parse.
    #[error("invalid value '{value}' for {var}: expected whole seconds")]
    InvalidInterval {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
}

/// Runtime configuration for the supervisor process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path of the persisted extension list.
    pub settings_path: PathBuf,
    /// Extension catalog URL.
    pub manifest_url: String,
    /// Reconciliation tick interval.
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            settings_path: default_settings_path(),
            manifest_url: DEFAULT_MANIFEST_URL.to_string(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl Config {
    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables: `DECKHAND_SETTINGS_PATH`, `DECKHAND_MANIFEST_URL`,
    /// `DECKHAND_TICK_SECS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("DECKHAND_SETTINGS_PATH") {
            config.settings_path = PathBuf::from(path);
        }
        if let Ok(url) = std::env::var("DECKHAND_MANIFEST_URL") {
            config.manifest_url = url;
        }
        if let Ok(secs) = std::env::var("DECKHAND_TICK_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidInterval {
                var: "DECKHAND_TICK_SECS",
                value: secs.clone(),
            })?;
            config.tick_interval = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

fn default_settings_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("deckhand")
        .join("extensions.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.tick_interval, Duration::from_secs(5));
        assert!(config.settings_path.ends_with("deckhand/extensions.json"));
        assert!(config.manifest_url.starts_with("https://"));
    }
}
