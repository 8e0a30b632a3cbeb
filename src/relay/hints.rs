//! Last-resort resolution from path-like event attributes

use tracing::debug;

use super::workspace::{WorkspaceRoot, expand_home, find_vcs_root};

/// Resolve the first hint that sits inside a repository.
///
/// Hints are tried in the order given. A hint outside any repository is
/// skipped: a bare directory or file is not a workspace on its own.
pub fn resolve_hints(hints: &[&str]) -> Option<WorkspaceRoot> {
    hints.iter().find_map(|hint| {
        let hint = hint.trim();
        if hint.is_empty() {
            return None;
        }
        let root = find_vcs_root(&expand_home(hint));
        if root.is_none() {
            debug!(hint, "hint is not inside a repository");
        }
        root
    })
}
