//! Structured patch parsing and patch-path → workspace matching
//!
//! `apply_patch` arguments use the agent's envelope format:
//!
//! ```text
//! *** Begin Patch
//! *** Update File: src/lib.rs
//! *** Move to: src/core.rs
//! @@ ...
//! *** End Patch
//! ```
//!
//! Only the file directives matter for routing.

use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeSet;

use super::workspace::{WorkspaceRegistry, WorkspaceRoot};

const ADD_PREFIX: &str = "*** Add File: ";
const UPDATE_PREFIX: &str = "*** Update File: ";
const DELETE_PREFIX: &str = "*** Delete File: ";
const MOVE_PREFIX: &str = "*** Move to: ";
const BEGIN_MARKER: &str = "*** Begin Patch";

const DIRECTIVES: [(&str, fn(String) -> PatchDirective); 4] = [
    (ADD_PREFIX, PatchDirective::Add),
    (UPDATE_PREFIX, PatchDirective::Update),
    (DELETE_PREFIX, PatchDirective::Delete),
    (MOVE_PREFIX, PatchDirective::Move),
];

/// One file-level instruction inside a patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchDirective {
    /// `*** Add File: <path>`
    Add(String),
    /// `*** Update File: <path>`
    Update(String),
    /// `*** Delete File: <path>`
    Delete(String),
    /// `*** Move to: <path>`
    Move(String),
}

impl PatchDirective {
    /// Normalized path operand
    pub fn path(&self) -> &str {
        match self {
            PatchDirective::Add(path)
            | PatchDirective::Update(path)
            | PatchDirective::Delete(path)
            | PatchDirective::Move(path) => path,
        }
    }

    fn parse_line(line: &str) -> Option<Self> {
        let (make, operand) = DIRECTIVES
            .iter()
            .find_map(|(prefix, make)| line.strip_prefix(*prefix).map(|rest| (*make, rest)))?;
        normalize_path(operand).map(make)
    }
}

/// Normalize a directive operand.
///
/// Strips one leading `a/` or `b/` diff marker, then a leading `./`, and
/// collapses a run of leading slashes to one. Blank operands yield `None`.
pub fn normalize_path(raw: &str) -> Option<String> {
    let mut path = raw.trim();
    if path.is_empty() {
        return None;
    }
    if let Some(rest) = path.strip_prefix("b/").or_else(|| path.strip_prefix("a/")) {
        path = rest;
    }
    if let Some(rest) = path.strip_prefix("./") {
        path = rest;
    }
    while path.starts_with("//") {
        path = &path[1..];
    }
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

/// Parse every file directive in a patch, in order.
pub fn parse_directives(patch_text: &str) -> Vec<PatchDirective> {
    let text = unwrap_patch_text(patch_text);
    text.lines().filter_map(PatchDirective::parse_line).collect()
}

/// Distinct normalized paths touched by a patch.
pub fn extract_paths(patch_text: &str) -> BTreeSet<String> {
    parse_directives(patch_text)
        .iter()
        .map(|directive| directive.path().to_string())
        .collect()
}

/// Pick the workspace a single patch path belongs to.
///
/// Absolute paths take the longest root they sit under. Relative paths take
/// the longest root in which they exist on disk. Failing both, the longest
/// registered root is used.
pub fn best_root_for_path<'r>(
    path: &str,
    registry: &'r WorkspaceRegistry,
) -> Option<&'r WorkspaceRoot> {
    if path.is_empty() || registry.is_empty() {
        return None;
    }

    let matched = if path.starts_with('/') {
        registry
            .roots()
            .iter()
            .filter(|root| contains_absolute(root, path))
            .max_by_key(|root| root.as_str().len())
    } else {
        registry
            .roots()
            .iter()
            .filter(|root| root.as_path().join(path).exists())
            .max_by_key(|root| root.as_str().len())
    };

    matched.or_else(|| registry.longest())
}

/// Every workspace root a patch touches.
pub fn match_roots(patch_text: &str, registry: &WorkspaceRegistry) -> BTreeSet<WorkspaceRoot> {
    extract_paths(patch_text)
        .iter()
        .filter_map(|path| best_root_for_path(path, registry))
        .cloned()
        .collect()
}

fn contains_absolute(root: &WorkspaceRoot, path: &str) -> bool {
    let trimmed = root.as_str().trim_end_matches('/');
    if trimmed.is_empty() {
        // "/" contains every absolute path
        return true;
    }
    path == root.as_str()
        || path == trimmed
        || path
            .strip_prefix(trimmed)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Tool arguments may arrive as the raw patch, as a JSON object wrapping it
/// (`{"input": "..."}`), or with leading shell text before the patch body.
fn unwrap_patch_text(text: &str) -> Cow<'_, str> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        if let Ok(Value::Object(args)) = serde_json::from_str::<Value>(trimmed) {
            let inner = ["input", "patch", "command"]
                .iter()
                .find_map(|key| args.get(*key))
                .and_then(|value| match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Array(parts) => Some(
                        parts
                            .iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join("\n"),
                    ),
                    _ => None,
                });
            if let Some(inner) = inner {
                return Cow::Owned(inner);
            }
        }
    }
    match text.find(BEGIN_MARKER) {
        Some(idx) if idx > 0 => Cow::Borrowed(&text[idx..]),
        _ => Cow::Borrowed(text),
    }
}
