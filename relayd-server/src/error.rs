//! Server error types.

use std::net::SocketAddr;
use thiserror::Error;

/// Server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening endpoint could not be claimed. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// The accept operation failed. During shutdown this is the expected
    /// unwind signal for the accept loop, not an anomaly.
    #[error("accept failed: {0}")]
    Accept(std::io::Error),

    /// Storage schema could not be ensured. Fatal at startup.
    #[error("schema initialization failed: {0}")]
    Schema(#[from] relayd_storage::StorageError),
}
