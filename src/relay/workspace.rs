//! Workspace roots and the registry of known projects
//!
//! The editor side records every project it manages in a shared state file
//! (a JSON object keyed by project root). The relay never writes it and reads
//! it fresh for each resolution, since editors come and go independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::StorageResult;

/// Directory (or worktree file) marking a repository root.
pub const VCS_MARKER: &str = ".git";

/// Top-level directory of one managed project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkspaceRoot(pub String);

impl WorkspaceRoot {
    /// Create a new workspace root
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    /// Root as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Root as a filesystem path
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }

    fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

impl fmt::Display for WorkspaceRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of the known workspace roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceRegistry {
    roots: Vec<WorkspaceRoot>,
}

impl WorkspaceRegistry {
    /// Build a registry from explicit roots. Blank roots are ignored.
    pub fn from_roots<I, S>(roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut roots: Vec<WorkspaceRoot> = roots
            .into_iter()
            .map(Into::into)
            .filter(|root: &String| !root.trim().is_empty())
            .map(WorkspaceRoot)
            .collect();
        roots.sort();
        roots.dedup();
        Self { roots }
    }

    /// Read the project state file.
    pub fn read(path: &Path) -> StorageResult<Self> {
        let data = fs::read(path)?;
        let state: Value = serde_json::from_slice(&data)?;
        let roots = state
            .as_object()
            .map(|projects| projects.keys().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(Self::from_roots(roots))
    }

    /// Read the project state file, treating any failure as "no projects".
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "project state file missing");
            return Self::default();
        }
        match Self::read(path) {
            Ok(registry) => registry,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "project state file unreadable");
                Self::default()
            }
        }
    }

    /// Known roots, sorted.
    pub fn roots(&self) -> &[WorkspaceRoot] {
        &self.roots
    }

    /// Whether no workspace is registered
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// The most specific (longest) registered root.
    pub fn longest(&self) -> Option<&WorkspaceRoot> {
        self.roots.iter().max_by_key(|root| root.0.len())
    }
}

/// Expand a leading `~` to `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home);
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Walk upward from `start` looking for a repository marker.
///
/// `start` may name a file (its directory is used) or a path that no longer
/// exists (the nearest existing ancestor is used). Returns the canonical root.
pub fn find_vcs_root(start: &Path) -> Option<WorkspaceRoot> {
    let mut current = existing_dir(start)?;
    loop {
        if current.join(VCS_MARKER).exists() {
            return Some(WorkspaceRoot::from_path(&current));
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Root for an agent working directory: the enclosing repository, or the
/// directory itself when it is not inside one.
pub fn root_for_working_dir(cwd: &str) -> Option<WorkspaceRoot> {
    let cwd = cwd.trim();
    if cwd.is_empty() {
        return None;
    }
    let path = expand_home(cwd);
    find_vcs_root(&path).or_else(|| {
        let resolved = fs::canonicalize(&path).unwrap_or(path);
        Some(WorkspaceRoot::from_path(&resolved))
    })
}

fn existing_dir(start: &Path) -> Option<PathBuf> {
    let mut candidate = start.to_path_buf();
    loop {
        if let Ok(canon) = fs::canonicalize(&candidate) {
            if canon.is_dir() {
                return Some(canon);
            }
            return canon.parent().map(Path::to_path_buf);
        }
        if !candidate.pop() || candidate.as_os_str().is_empty() {
            return None;
        }
    }
}
