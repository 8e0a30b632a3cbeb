//! Shared fixtures for the relay integration tests.

#![allow(dead_code)]

use otel_relay::relay::channel::{Connector, ControlChannel};
use otel_relay::relay::error::ChannelResult;
use otel_relay::relay::router::Rendezvous;
use otel_relay::relay::WorkspaceRoot;
use otel_relay::{Relay, RelayConfig};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

/// One payload handed to an editor channel.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub address: String,
    pub payload: Value,
}

pub type Deliveries = Arc<Mutex<Vec<Delivery>>>;

struct RecordingChannel {
    address: String,
    log: Deliveries,
}

impl ControlChannel for RecordingChannel {
    fn deliver(&mut self, payload: &Value) -> ChannelResult<()> {
        self.log.lock().push(Delivery {
            address: self.address.clone(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Connector that records instead of talking to an editor.
pub struct RecordingConnector(pub Deliveries);

impl Connector for RecordingConnector {
    fn connect(&self, address: &str) -> ChannelResult<Box<dyn ControlChannel>> {
        Ok(Box::new(RecordingChannel {
            address: address.to_string(),
            log: Arc::clone(&self.0),
        }))
    }
}

/// A relay confined to a temp directory, with recorded deliveries.
pub struct Harness {
    pub temp: TempDir,
    pub relay: Arc<Relay>,
    pub deliveries: Deliveries,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let config = config_in(&temp);
        let deliveries = Deliveries::default();
        let relay = Relay::new(config, Box::new(RecordingConnector(Arc::clone(&deliveries))));
        Self {
            temp,
            relay: Arc::new(relay),
            deliveries,
        }
    }

    /// Record `roots` in the editor project state file.
    pub fn register(&self, roots: &[&str]) {
        let state: serde_json::Map<String, Value> = roots
            .iter()
            .map(|root| (root.to_string(), json!({})))
            .collect();
        fs::write(&self.relay.config().state_file, Value::Object(state).to_string())
            .expect("write state file");
    }

    /// Publish a rendezvous file for `root`, returning the address written.
    pub fn publish(&self, root: &str) -> String {
        let address = format!("{root}/editor.sock");
        publish_address(self.relay.config(), root, &address);
        address
    }

    pub fn forwarded(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }
}

pub fn config_in(temp: &TempDir) -> RelayConfig {
    let config = RelayConfig {
        state_file: temp.path().join("state.json"),
        session_dir: temp.path().join("sessions"),
        runtime_dir: temp.path().join("run"),
        ..RelayConfig::default()
    };
    fs::create_dir_all(&config.runtime_dir).expect("runtime dir");
    config
}

pub fn publish_address(config: &RelayConfig, root: &str, address: &str) {
    let rendezvous = Rendezvous::new(config.runtime_dir.clone());
    fs::write(rendezvous.path_for(&WorkspaceRoot::new(root)), address).expect("rendezvous");
}

pub fn kv(key: &str, value: &str) -> Value {
    json!({"key": key, "value": {"stringValue": value}})
}

pub fn record(attrs: &[(&str, &str)]) -> Value {
    let attributes: Vec<Value> = attrs.iter().map(|(k, v)| kv(k, v)).collect();
    json!({"timeUnixNano": "1700000000000000000", "attributes": attributes})
}

/// Export request with every record under one resource and scope.
pub fn export(records: Vec<Value>) -> Value {
    json!({
        "resourceLogs": [{
            "resource": {"attributes": [kv("service.name", "codex_cli_rs")]},
            "scopeLogs": [{
                "scope": {"name": "codex_otel", "version": "0.1.0"},
                "logRecords": records
            }]
        }]
    })
}

pub fn patch_result(patch: &str) -> Value {
    record(&[
        ("event.name", "codex.tool_result"),
        ("tool_name", "apply_patch"),
        ("arguments", patch),
    ])
}
