//! otel-relay – routes coding-agent telemetry to the editor owning each workspace
//!
//! The agent exports its tool activity as OTLP/HTTP JSON logs. This crate:
//! - Accepts export requests on `POST /v1/logs`
//! - Flattens them into per-record events and keeps only agent tool activity
//! - Resolves each event to workspace roots (conversation, patch paths, path hints)
//! - Forwards a single-record copy to every matching editor over msgpack-RPC

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Routing core: decoding, classification, resolution and delivery
pub mod relay;

/// HTTP ingestion endpoint
pub mod service;

// Re-export key types for convenience
pub use relay::{Relay, RelayConfig};

/// Current version of the relay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
