//! Error types for the container runtime boundary.

use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur talking to the container engine.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The engine could not be reached (socket missing, daemon down).
    #[error("container runtime unreachable: {reason}")]
    Unreachable {
        /// Reason the connection failed.
        reason: String,
    },

    /// The engine accepted the connection but the API call failed.
    #[error("container runtime call failed: {reason}")]
    Api {
        /// Reason reported by the engine.
        reason: String,
    },

    /// A container create payload could not be interpreted by the engine
    /// client. Permissions blobs are passed through opaquely, so a malformed
    /// blob only surfaces here.
    #[error("invalid container configuration: {reason}")]
    InvalidConfig {
        /// Reason the payload was rejected.
        reason: String,
    },
}
