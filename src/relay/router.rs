//! Per-workspace delivery
//!
//! Editors publish their control address in a rendezvous file named after a
//! short hash of the workspace root. The router turns a root into a live
//! channel, caches it, and drops it again as soon as a delivery fails so the
//! next event reconnects (the editor may have restarted on a new socket).

use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::channel::{Connector, ControlChannel};
use super::error::{ChannelError, ChannelResult};
use super::workspace::WorkspaceRoot;

const RENDEZVOUS_PREFIX: &str = "nvim-claude-";
const RENDEZVOUS_SUFFIX: &str = "-server";
const ROOT_HASH_LEN: usize = 8;

/// Locates editor rendezvous files.
#[derive(Debug, Clone)]
pub struct Rendezvous {
    dir: PathBuf,
}

impl Rendezvous {
    /// Rendezvous files live directly in `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Rendezvous file for `root`.
    pub fn path_for(&self, root: &WorkspaceRoot) -> PathBuf {
        let digest = hex::encode(Sha256::digest(root.as_str().as_bytes()));
        self.dir.join(format!(
            "{RENDEZVOUS_PREFIX}{}{RENDEZVOUS_SUFFIX}",
            &digest[..ROOT_HASH_LEN]
        ))
    }

    /// Published control address for `root`.
    pub fn read_address(&self, root: &WorkspaceRoot) -> ChannelResult<String> {
        let path = self.path_for(root);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ChannelError::NoRendezvous(path));
            }
            Err(err) => return Err(err.into()),
        };
        let address = contents.trim();
        if address.is_empty() {
            return Err(ChannelError::EmptyRendezvous(path));
        }
        Ok(address.to_string())
    }
}

type SharedChannel = Arc<Mutex<Box<dyn ControlChannel>>>;

/// Cached channels keyed by workspace root.
///
/// The map lock is only held to look up or swap entries; delivery holds the
/// per-channel lock, so a stalled editor blocks only its own workspace.
pub struct Router {
    rendezvous: Rendezvous,
    connector: Box<dyn Connector>,
    channels: Mutex<HashMap<WorkspaceRoot, SharedChannel>>,
}

impl Router {
    /// Create a router that connects through `connector`.
    pub fn new(rendezvous: Rendezvous, connector: Box<dyn Connector>) -> Self {
        Self {
            rendezvous,
            connector,
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Deliver `payload` to the editor owning `root`.
    ///
    /// Connects lazily. A failed delivery evicts the cached channel.
    pub fn forward(&self, root: &WorkspaceRoot, payload: &Value) -> ChannelResult<()> {
        let channel = self.channel_for(root)?;
        self.deliver_on(root, &channel, payload)
    }

    /// Number of cached channels.
    pub fn connection_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Whether a channel to `root` is cached.
    pub fn is_connected(&self, root: &WorkspaceRoot) -> bool {
        self.channels.lock().contains_key(root)
    }

    fn channel_for(&self, root: &WorkspaceRoot) -> ChannelResult<SharedChannel> {
        if let Some(channel) = self.channels.lock().get(root) {
            return Ok(Arc::clone(channel));
        }

        let address = self.rendezvous.read_address(root)?;
        debug!(root = %root, address = %address, "connecting to editor");
        let channel: SharedChannel = Arc::new(Mutex::new(self.connector.connect(&address)?));
        info!(root = %root, address = %address, "connected to editor");

        // another worker may have connected meanwhile; keep the first one
        let mut channels = self.channels.lock();
        let entry = channels.entry(root.clone()).or_insert(channel);
        Ok(Arc::clone(entry))
    }

    /// Deliver on `channel`, evicting it only if it is still the cached one.
    fn deliver_on(
        &self,
        root: &WorkspaceRoot,
        channel: &SharedChannel,
        payload: &Value,
    ) -> ChannelResult<()> {
        let outcome = channel.lock().deliver(payload);

        if let Err(err) = &outcome {
            let mut channels = self.channels.lock();
            if channels
                .get(root)
                .is_some_and(|current| Arc::ptr_eq(current, channel))
            {
                warn!(root = %root, error = %err, "delivery failed, dropping channel");
                channels.remove(root);
            } else {
                debug!(root = %root, error = %err, "stale channel failed, already replaced");
            }
        }
        outcome
    }
}
