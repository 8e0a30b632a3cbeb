//! Telemetry routing core
//!
//! An export request is flattened into per-record events, relevant agent
//! events are classified, each is resolved to the workspace roots it belongs
//! to, and a single-record copy is forwarded to the editor owning each root.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// Submodules
pub mod attribute;
pub mod channel;
pub mod classify;
pub mod conversation;
pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod hints;
pub mod patch;
pub mod router;
pub mod storage;
pub mod workspace;

/// Default OTLP/HTTP port
pub const DEFAULT_PORT: u16 = 4318;

/// Configuration for the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the ingestion endpoint binds to
    pub bind: String,

    /// Port the ingestion endpoint listens on
    pub port: u16,

    /// Editor-maintained project state file (keys are workspace roots)
    pub state_file: PathBuf,

    /// Agent session store searched for conversation rollouts
    pub session_dir: PathBuf,

    /// Directory holding editor rendezvous files
    pub runtime_dir: PathBuf,

    /// Connect, read and write timeout for editor channels, in milliseconds
    pub forward_timeout_ms: u64,

    /// Seconds before a failed conversation lookup is retried (0 = never)
    pub negative_ttl_secs: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let runtime_dir = std::env::var_os("XDG_RUNTIME_DIR")
            .filter(|dir| !dir.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        Self {
            bind: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            state_file: home.join(".local/share/nvim/nvim-claude/projects/state.json"),
            session_dir: home.join(".codex/sessions"),
            runtime_dir,
            forward_timeout_ms: 5_000,
            negative_ttl_secs: 10,
        }
    }
}

impl RelayConfig {
    /// Timeout applied to editor channels.
    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms.max(1))
    }

    /// How long a failed conversation lookup is trusted, `None` for forever.
    pub fn negative_ttl(&self) -> Option<Duration> {
        (self.negative_ttl_secs > 0).then(|| Duration::from_secs(self.negative_ttl_secs))
    }

    /// `bind:port` for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.bind.trim().is_empty() {
            return Err(RelayError::Config("bind address is empty".into()));
        }
        for (name, path) in [
            ("state file", &self.state_file),
            ("session directory", &self.session_dir),
            ("runtime directory", &self.runtime_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(RelayError::Config(format!("{name} path is empty")));
            }
        }
        Ok(())
    }
}

// Re-export commonly used types
pub use dispatch::{IngestReport, Relay, Resolution};
pub use error::{RelayError, Result};
pub use workspace::WorkspaceRoot;
