//! Conversation → workspace resolution
//!
//! Every agent session writes an append-only JSONL rollout file whose name
//! embeds the conversation id. Its `session_meta` record carries the working
//! directory the session was started in, which pins the conversation to one
//! workspace for its whole lifetime. Successful lookups are cached for the
//! life of the process.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::workspace::{WorkspaceRoot, root_for_working_dir};

/// Record type carrying session metadata.
pub const SESSION_META_TYPE: &str = "session_meta";
const SESSION_FILE_EXTENSION: &str = "jsonl";

/// Cached outcome for one conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedRoute {
    /// Conversation belongs to this workspace
    Resolved(WorkspaceRoot),
    /// No workspace could be found when last checked
    Unresolved {
        /// When the failed lookup happened
        at: Instant,
    },
}

/// Read-only view over the agent's session directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Find the rollout file for a conversation.
    ///
    /// Files are visited in name order, so when a conversation was resumed
    /// into several files the oldest one wins; they share a working directory.
    pub fn find_session_file(&self, conversation_id: &str) -> Option<PathBuf> {
        if conversation_id.is_empty() || !self.dir.is_dir() {
            return None;
        }

        WalkDir::new(&self.dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| {
                let path = entry.path();
                path.extension().and_then(|ext| ext.to_str()) == Some(SESSION_FILE_EXTENSION)
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| name.contains(conversation_id))
            })
            .map(|entry| entry.into_path())
    }

    /// Working directory declared by the first `session_meta` record.
    pub fn working_dir(path: &Path) -> Option<String> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "cannot open session file");
                return None;
            }
        };

        for line in BufReader::new(file).lines() {
            let Ok(line) = line else {
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<Value>(line) else {
                continue;
            };
            if record.get("type").and_then(Value::as_str) != Some(SESSION_META_TYPE) {
                continue;
            }
            return record
                .get("payload")
                .and_then(|payload| payload.get("cwd"))
                .or_else(|| record.get("cwd"))
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        None
    }
}

/// Conversation id → workspace root, cached for the life of the process.
pub struct ConversationResolver {
    store: SessionStore,
    negative_ttl: Option<Duration>,
    cache: Mutex<HashMap<String, CachedRoute>>,
    scans: AtomicU64,
}

impl ConversationResolver {
    /// Create a resolver over `store`.
    ///
    /// Failed lookups are retried once `negative_ttl` has elapsed; `None`
    /// keeps them forever.
    pub fn new(store: SessionStore, negative_ttl: Option<Duration>) -> Self {
        Self {
            store,
            negative_ttl,
            cache: Mutex::new(HashMap::new()),
            scans: AtomicU64::new(0),
        }
    }

    /// Resolve a conversation, consulting the cache first.
    pub fn resolve(&self, conversation_id: &str) -> Option<WorkspaceRoot> {
        if conversation_id.is_empty() {
            return None;
        }

        if let Some(hit) = self.cached(conversation_id) {
            return match hit {
                CachedRoute::Resolved(root) => Some(root),
                CachedRoute::Unresolved { .. } => None,
            };
        }

        let outcome = self.scan(conversation_id);
        let entry = match &outcome {
            Some(root) => CachedRoute::Resolved(root.clone()),
            None => CachedRoute::Unresolved { at: Instant::now() },
        };
        self.cache.lock().insert(conversation_id.to_string(), entry);
        outcome
    }

    /// Live cache entry for a conversation, if any.
    pub fn cached(&self, conversation_id: &str) -> Option<CachedRoute> {
        let mut cache = self.cache.lock();
        let entry = cache.get(conversation_id)?.clone();
        if let CachedRoute::Unresolved { at } = entry {
            if self.expired(at) {
                cache.remove(conversation_id);
                return None;
            }
        }
        Some(entry)
    }

    /// Pin a conversation to a workspace without scanning.
    pub fn remember(&self, conversation_id: impl Into<String>, root: WorkspaceRoot) {
        self.cache
            .lock()
            .insert(conversation_id.into(), CachedRoute::Resolved(root));
    }

    /// Number of session-store scans performed so far.
    pub fn scan_count(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    fn expired(&self, at: Instant) -> bool {
        self.negative_ttl.is_some_and(|ttl| at.elapsed() >= ttl)
    }

    fn scan(&self, conversation_id: &str) -> Option<WorkspaceRoot> {
        self.scans.fetch_add(1, Ordering::Relaxed);

        let Some(path) = self.store.find_session_file(conversation_id) else {
            debug!(conversation = conversation_id, "no session file for conversation");
            return None;
        };
        let Some(cwd) = SessionStore::working_dir(&path) else {
            debug!(
                conversation = conversation_id,
                path = %path.display(),
                "session file has no session_meta working directory"
            );
            return None;
        };

        let root = root_for_working_dir(&cwd);
        debug!(
            conversation = conversation_id,
            cwd = %cwd,
            root = ?root,
            "resolved conversation from session file"
        );
        root
    }
}
