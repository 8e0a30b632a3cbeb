//! End-to-end delivery over a real msgpack-RPC socket
//!
//! A stub editor listens on a Unix socket published through a rendezvous
//! file; the relay is driven through the HTTP router with real editor
//! channels.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{config_in, export, patch_result, publish_address, record};
use otel_relay::relay::channel::LISTENER_LUA;
use otel_relay::{Relay, service};
use serde_json::Value;
use std::io::{BufReader, Write};
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tempfile::TempDir;
use tower::ServiceExt;

type ExecLua = (u64, u32, String, (String, Vec<Value>));

/// Accepts one connection and answers `count` requests.
fn stub_editor(socket: &Path, count: usize) -> JoinHandle<Vec<ExecLua>> {
    let listener = UnixListener::bind(socket).expect("bind stub editor");
    thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept");
        let mut reader = BufReader::new(stream.try_clone().expect("clone"));
        let mut writer = stream;
        let mut requests = Vec::new();
        for _ in 0..count {
            let request: ExecLua = rmp_serde::decode::from_read(&mut reader).expect("request");
            rmp_serde::encode::write(&mut writer, &(1u8, request.1, (), ())).expect("response");
            writer.flush().expect("flush");
            requests.push(request);
        }
        requests
    })
}

async fn post(relay: &Arc<Relay>, payload: &Value) -> StatusCode {
    let request = Request::builder()
        .method("POST")
        .uri("/v1/logs")
        .body(Body::from(payload.to_string()))
        .expect("request");
    service::router(Arc::clone(relay))
        .oneshot(request)
        .await
        .expect("response")
        .status()
}

#[tokio::test]
async fn forwarded_event_reaches_editor_as_exec_lua() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(&temp);
    let socket = temp.path().join("nvim.sock");
    let editor = stub_editor(&socket, 2);

    std::fs::write(&config.state_file, r#"{"/work/site": {}}"#).expect("state");
    publish_address(&config, "/work/site", socket.to_str().expect("utf-8 path"));
    let relay = Arc::new(Relay::with_editor_channels(config));

    let payload = export(vec![
        record(&[("event.name", "codex.conversation_starts")]),
        patch_result("*** Update File: /work/site/index.html\n"),
    ]);
    assert_eq!(post(&relay, &payload).await, StatusCode::OK);
    assert_eq!(post(&relay, &payload).await, StatusCode::OK);

    let requests = tokio::task::spawn_blocking(move || editor.join().expect("stub editor"))
        .await
        .expect("join");
    assert_eq!(requests.len(), 2);

    let (kind, msgid, method, (code, args)) = &requests[0];
    assert_eq!(*kind, 0);
    assert_eq!(*msgid, 1);
    assert_eq!(method, "nvim_exec_lua");
    assert_eq!(code, LISTENER_LUA);
    assert_eq!(args.len(), 1);
    let records = args[0]["resourceLogs"][0]["scopeLogs"][0]["logRecords"]
        .as_array()
        .expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0], payload["resourceLogs"][0]["scopeLogs"][0]["logRecords"][1]);

    // the second request reused the same connection
    assert_eq!(requests[1].1, 2);
    assert_eq!(relay.router().connection_count(), 1);
}

#[tokio::test]
async fn dead_editor_is_dropped_and_request_still_succeeds() {
    let temp = TempDir::new().expect("tempdir");
    let config = config_in(&temp);
    let socket = temp.path().join("gone.sock");

    std::fs::write(&config.state_file, r#"{"/work/site": {}}"#).expect("state");
    publish_address(&config, "/work/site", socket.to_str().expect("utf-8 path"));
    let relay = Arc::new(Relay::with_editor_channels(config));

    let payload = export(vec![patch_result("*** Add File: /work/site/a.txt\n")]);
    assert_eq!(post(&relay, &payload).await, StatusCode::OK);
    assert_eq!(relay.router().connection_count(), 0);
}
