//! Error types for supervisor operations.

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::runtime::RuntimeError;
use crate::settings::SettingsError;

/// Result type for supervisor operations.
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors surfaced by extension lifecycle operations.
///
/// Partial uninstall failure (container removed, image delete or persist
/// failed) is deliberately not a variant of its own: it propagates as the
/// underlying error and the stale desired-state record is a documented gap.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A container engine call failed.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// An operation required a container that is not currently running.
    #[error("container '{name}' does not exist")]
    ContainerDoesNotExist {
        /// Name that was looked up.
        name: String,
    },

    /// Uninstall target is not in the desired extension list.
    #[error("extension '{name}' is not installed")]
    ExtensionNotFound {
        /// Requested extension name.
        name: String,
    },

    /// Desired state could not be loaded or persisted.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// The extension catalog could not be fetched.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}
