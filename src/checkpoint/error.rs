//! Checkpoint error types.

use thiserror::Error;

/// Why a persisted payload could not be written or trusted.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Could not encode saved state: {0}")]
    Encode(String),

    /// Bytes are not a checkpoint in the configured format
    #[error("Saved state is unreadable: {0}")]
    Decode(String),

    #[error("Saved state has format version {found}, this build reads {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Decoded fine but does not fit what it describes
    #[error("Saved state is inconsistent: {0}")]
    Inconsistent(String),
}
