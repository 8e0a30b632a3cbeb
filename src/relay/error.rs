//! Error types for the relay
//!
//! Domain errors use thiserror; the binary converts them to anyhow at the
//! process boundary. None of these ever reach the telemetry source: the
//! ingestion endpoint logs them and moves on.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level relay error
#[derive(Debug, Error)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised while locating or talking to an editor control channel
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No rendezvous file has been published for the workspace
    #[error("No rendezvous file at {0}")]
    NoRendezvous(PathBuf),

    /// The rendezvous file exists but carries no address
    #[error("Rendezvous file {0} is empty")]
    EmptyRendezvous(PathBuf),

    /// Connecting to the published address failed
    #[error("Connect to {address} failed: {source}")]
    Connect {
        /// Address read from the rendezvous file
        address: String,
        /// Underlying socket error
        #[source]
        source: io::Error,
    },

    /// Payload could not be encoded as msgpack
    #[error("Encoding failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// The peer answered with an RPC error
    #[error("RPC error from editor: {0}")]
    Rpc(String),

    /// The peer answered with something that is not a msgpack-RPC message
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// IO error on an established channel
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience result alias for channel operations
pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

/// Filesystem errors for files the relay owns (pid file) or reads (state file)
#[derive(Debug, Error)]
pub enum StorageError {
    /// Atomic write failed
    #[error("Atomic write failed for {path}: {detail}")]
    AtomicWriteFailed {
        /// Path where write failed
        path: PathBuf,
        /// Error details
        detail: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;
