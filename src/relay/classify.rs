//! Event classification
//!
//! Decides which flattened records are agent tool activity worth routing and
//! pulls out the fields the resolvers key on.

use super::envelope::{BODY_KEY, FlatEvent};

/// Event names outside this namespace are never routed.
pub const EVENT_NAMESPACE: &str = "codex.";
/// Event emitted after a tool call completes.
pub const TOOL_RESULT_EVENT: &str = "codex.tool_result";
/// Tool whose arguments are a structured patch.
pub const PATCH_TOOL: &str = "apply_patch";

const EVENT_NAME_KEYS: [&str; 2] = ["event.name", "event_name"];
const TOOL_NAME_KEY: &str = "tool_name";
const CONVERSATION_ID_KEYS: [&str; 3] = ["conversation.id", "conversation_id", "conversationId"];
const PATCH_TEXT_KEYS: [&str; 3] = ["arguments", "tool_arguments", BODY_KEY];

/// Attributes that may name a directory or file inside the workspace, in
/// priority order.
pub const HINT_KEYS: [&str; 6] = [
    "cwd",
    "git_root",
    "project_root",
    "root",
    "file_path",
    "target_file",
];

/// A relevant event and its routing fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolEvent<'e> {
    /// Full event name, e.g. `codex.tool_result`.
    pub event_name: &'e str,
    /// Conversation the event belongs to, if the exporter tagged it.
    pub conversation_id: Option<&'e str>,
    /// Patch text when this is an `apply_patch` tool result.
    pub patch_text: Option<&'e str>,
    /// Direct path hints in `HINT_KEYS` order.
    pub hints: Vec<&'e str>,
}

impl ToolEvent<'_> {
    /// Whether this event is the result of a file-patching tool call.
    pub fn is_patch_result(&self) -> bool {
        self.patch_text.is_some()
    }
}

/// Classify a flattened event, returning `None` when it is not routable.
pub fn classify<'e>(event: &'e FlatEvent<'_>) -> Option<ToolEvent<'e>> {
    let event_name = event.first_str(&EVENT_NAME_KEYS)?;
    if !event_name.starts_with(EVENT_NAMESPACE) {
        return None;
    }

    let patch_text = if event_name == TOOL_RESULT_EVENT
        && event.first_str(&[TOOL_NAME_KEY]) == Some(PATCH_TOOL)
    {
        event.first_str(&PATCH_TEXT_KEYS)
    } else {
        None
    };

    let hints = HINT_KEYS
        .iter()
        .filter_map(|key| event.first_str(&[*key]))
        .collect();

    Some(ToolEvent {
        event_name,
        conversation_id: event.first_str(&CONVERSATION_ID_KEYS),
        patch_text,
        hints,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::envelope::flatten;
    use serde_json::{Value, json};

    fn envelope(attrs: Value, body: Option<Value>) -> Value {
        let mut record = json!({ "attributes": attrs });
        if let Some(body) = body {
            record["body"] = body;
        }
        json!({"resourceLogs": [{"scopeLogs": [{"logRecords": [record]}]}]})
    }

    fn kv(key: &str, value: &str) -> Value {
        json!({"key": key, "value": {"stringValue": value}})
    }

    #[test]
    fn ignores_events_outside_namespace() {
        let payload = envelope(json!([kv("event.name", "claude.tool_result")]), None);
        let event = flatten(&payload).next().expect("event");
        assert!(classify(&event).is_none());

        let payload = envelope(json!([kv("cwd", "/tmp")]), None);
        let event = flatten(&payload).next().expect("event");
        assert!(classify(&event).is_none());
    }

    #[test]
    fn extracts_conversation_and_hints() {
        let payload = envelope(
            json!([
                kv("event_name", "codex.user_prompt"),
                kv("conversationId", "abc-123"),
                kv("file_path", "/work/a/src/lib.rs"),
                kv("cwd", "/work/a"),
                kv("root", "")
            ]),
            None,
        );
        let event = flatten(&payload).next().expect("event");
        let tool = classify(&event).expect("relevant");

        assert_eq!(tool.event_name, "codex.user_prompt");
        assert_eq!(tool.conversation_id, Some("abc-123"));
        assert_eq!(tool.hints, vec!["/work/a", "/work/a/src/lib.rs"]);
        assert!(!tool.is_patch_result());
    }

    #[test]
    fn patch_text_only_for_apply_patch_results() {
        let patch = "*** Begin Patch\n*** Add File: a.txt\n*** End Patch";

        let payload = envelope(
            json!([
                kv("event.name", "codex.tool_result"),
                kv("tool_name", "apply_patch"),
                kv("tool_arguments", patch)
            ]),
            None,
        );
        let event = flatten(&payload).next().expect("event");
        assert_eq!(classify(&event).expect("relevant").patch_text, Some(patch));

        let payload = envelope(
            json!([kv("event.name", "codex.tool_result"), kv("tool_name", "apply_patch")]),
            Some(json!({"stringValue": patch})),
        );
        let event = flatten(&payload).next().expect("event");
        assert_eq!(classify(&event).expect("relevant").patch_text, Some(patch));

        let payload = envelope(
            json!([
                kv("event.name", "codex.tool_result"),
                kv("tool_name", "shell"),
                kv("arguments", patch)
            ]),
            None,
        );
        let event = flatten(&payload).next().expect("event");
        assert_eq!(classify(&event).expect("relevant").patch_text, None);
    }
}
