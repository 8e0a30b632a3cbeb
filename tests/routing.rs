//! Resolution and routing tests against the relay object directly.

mod common;

use common::{Harness, export, kv, patch_result, record};
use otel_relay::relay::WorkspaceRoot;
use proptest::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::thread;

fn write_session(harness: &Harness, conversation: &str, cwd: &str) {
    let dir = harness.relay.config().session_dir.join("2025/03/14");
    fs::create_dir_all(&dir).expect("session dir");
    let meta = json!({
        "timestamp": "2025-03-14T09:00:00.000Z",
        "type": "session_meta",
        "payload": {"id": conversation, "cwd": cwd, "originator": "codex_cli_rs"}
    });
    fs::write(
        dir.join(format!("rollout-2025-03-14T09-00-00-{conversation}.jsonl")),
        format!("{meta}\n{{\"type\":\"response_item\"}}\n"),
    )
    .expect("session file");
}

#[test]
fn conversation_is_scanned_once_then_served_from_cache() {
    let harness = Harness::new();
    let repo = harness.temp.path().join("project");
    fs::create_dir_all(repo.join(".git")).expect("repo");
    fs::create_dir_all(repo.join("crates/core")).expect("subdir");
    let root = fs::canonicalize(&repo).expect("canonical");
    let root = root.to_str().expect("utf-8 path");
    let address = harness.publish(root);

    write_session(
        &harness,
        "0199a1b2-c3d4",
        repo.join("crates/core").to_str().expect("utf-8 path"),
    );

    let payload = export(vec![
        record(&[("event.name", "codex.tool_decision"), ("conversation.id", "0199a1b2-c3d4")]),
        record(&[("event.name", "codex.sse_event"), ("conversation.id", "0199a1b2-c3d4")]),
    ]);
    let report = harness.relay.ingest(&payload);

    assert_eq!(report.forwarded, 2);
    assert_eq!(harness.relay.conversations().scan_count(), 1);
    assert!(harness.forwarded().iter().all(|d| d.address == address));

    harness.relay.ingest(&payload);
    assert_eq!(harness.relay.conversations().scan_count(), 1);
    assert_eq!(harness.forwarded().len(), 4);
    assert_eq!(harness.relay.router().connection_count(), 1);
}

#[test]
fn cached_conversation_resolves_without_scanning() {
    let harness = Harness::new();
    harness
        .relay
        .conversations()
        .remember("conv-cached", WorkspaceRoot::new("/work/cached"));
    harness.publish("/work/cached");

    let report = harness.relay.ingest(&export(vec![record(&[
        ("event.name", "codex.user_prompt"),
        ("conversation_id", "conv-cached"),
    ])]));

    assert_eq!(report.forwarded, 1);
    assert_eq!(harness.relay.conversations().scan_count(), 0);
}

#[test]
fn unknown_conversation_falls_through_to_patch_paths() {
    let harness = Harness::new();
    harness.register(&["/work/app"]);
    let address = harness.publish("/work/app");

    let payload = export(vec![record(&[
        ("event.name", "codex.tool_result"),
        ("tool_name", "apply_patch"),
        ("conversationId", "never-written"),
        ("tool_arguments", "*** Begin Patch\n*** Delete File: /work/app/old.rs\n*** End Patch"),
    ])]);
    let report = harness.relay.ingest(&payload);

    assert_eq!(report.forwarded, 1);
    assert_eq!(harness.forwarded()[0].address, address);
    assert_eq!(harness.relay.conversations().scan_count(), 1);
}

#[test]
fn patch_in_body_is_routed() {
    let harness = Harness::new();
    harness.register(&["/work/app"]);
    harness.publish("/work/app");

    let mut patch_record = record(&[
        ("event.name", "codex.tool_result"),
        ("tool_name", "apply_patch"),
    ]);
    patch_record["body"] = json!({"stringValue": "*** Update File: /work/app/src/main.rs\n"});

    let report = harness.relay.ingest(&export(vec![patch_record]));
    assert_eq!(report.forwarded, 1);
}

#[test]
fn concurrent_ingest_shares_one_connection() {
    const WORKERS: usize = 16;

    let harness = Harness::new();
    harness.register(&["/work/a"]);
    let address = harness.publish("/work/a");
    let payload = export(vec![patch_result("*** Update File: /work/a/src/lib.rs\n")]);

    thread::scope(|scope| {
        for _ in 0..WORKERS {
            scope.spawn(|| {
                let report = harness.relay.ingest(&payload);
                assert_eq!(report.forwarded, 1);
            });
        }
    });

    let forwarded = harness.forwarded();
    assert_eq!(forwarded.len(), WORKERS);
    assert!(forwarded.iter().all(|d| d.address == address));
    assert_eq!(harness.relay.router().connection_count(), 1);
}

fn non_agent_event_name() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z_]{1,12}\\.[a-z_]{1,16}",
        Just("codex".to_string()),
        Just("codex_tool_result".to_string()),
        Just("Codex.tool_result".to_string()),
        Just("claude_code.tool_result".to_string()),
        Just(String::new()),
    ]
    .prop_filter("outside the agent namespace", |name| !name.starts_with("codex."))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn events_outside_namespace_are_never_forwarded(
        name in non_agent_event_name(),
        name_key in prop::sample::select(vec!["event.name", "event_name"]),
        extra in prop::collection::vec(
            (
                prop::sample::select(vec!["cwd", "root", "file_path", "tool_name", "arguments", "conversation.id"]),
                "[ -~]{0,24}",
            ),
            0..6,
        ),
    ) {
        let harness = Harness::new();
        harness.register(&["/work/a"]);
        harness.publish("/work/a");
        harness.relay.conversations().remember("conv", WorkspaceRoot::new("/work/a"));

        let mut attributes: Vec<Value> = vec![
            kv(name_key, &name),
            kv("conversation.id", "conv"),
            kv("tool_name", "apply_patch"),
            kv("arguments", "*** Add File: /work/a/x.rs\n"),
        ];
        attributes.extend(extra.iter().map(|(k, v)| kv(k, v)));
        let payload = export(vec![json!({"attributes": attributes})]);

        let report = harness.relay.ingest(&payload);
        prop_assert_eq!(report.relevant, 0);
        prop_assert!(harness.forwarded().is_empty());
    }
}
