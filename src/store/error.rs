//! Storage error types.

use crate::checkpoint::CheckpointError;
use thiserror::Error;

/// Errors raised by key-value stores and the repositories on top of them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed
    #[error("Storage I/O failed for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Payload could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CheckpointError),
}
