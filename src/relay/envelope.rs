//! Flattening of OTLP log export envelopes
//!
//! An export request nests records three levels deep (resource → scope →
//! record). Routing works on one record at a time, so the envelope is walked
//! lazily and each record is paired with the merged attributes of its
//! resource. The borrowed originals are kept so a record can be re-wrapped on
//! its own when it is forwarded.

use serde_json::{Map, Value, json};

use super::attribute::{decode_any, decode_attributes};

const RESOURCE_LOGS_KEYS: [&str; 2] = ["resourceLogs", "resource_logs"];
const SCOPE_LOGS_KEYS: [&str; 2] = ["scopeLogs", "scope_logs"];
const LOG_RECORDS_KEYS: [&str; 2] = ["logRecords", "log_records"];
const SCOPE_KEYS: [&str; 2] = ["scope", "instrumentationScope"];

/// Key under which the decoded record body is stored.
pub const BODY_KEY: &str = "body";

/// One log record with the attributes routing needs.
#[derive(Debug, Clone)]
pub struct FlatEvent<'a> {
    attributes: Map<String, Value>,
    resource: &'a Value,
    scope: &'a Value,
    record: &'a Value,
}

impl<'a> FlatEvent<'a> {
    fn build(resource: &'a Value, scope: &'a Value, record: &'a Value) -> Self {
        let mut attributes =
            decode_attributes(resource.get("resource").and_then(|r| r.get("attributes")));
        attributes.extend(decode_attributes(record.get("attributes")));

        if let Some(body) = record.get(BODY_KEY).filter(|body| !body.is_null()) {
            attributes.insert(BODY_KEY.to_string(), decode_any(body));
        }

        Self {
            attributes,
            resource,
            scope,
            record,
        }
    }

    /// Merged resource and record attributes (record wins), plus `body`.
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    /// Look up a merged attribute.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// First of `keys` that holds a non-empty string.
    pub fn first_str(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|key| {
            self.attributes
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
    }

    /// The original record, untouched.
    pub fn record(&self) -> &'a Value {
        self.record
    }

    /// An export envelope carrying only this record under its original
    /// resource and scope.
    pub fn single_record_envelope(&self) -> Value {
        let resource = self
            .resource
            .get("resource")
            .cloned()
            .unwrap_or_else(|| json!({}));
        let scope = first_key(self.scope, &SCOPE_KEYS)
            .cloned()
            .unwrap_or(Value::Null);

        json!({
            "resourceLogs": [{
                "resource": resource,
                "scopeLogs": [{
                    "scope": scope,
                    "logRecords": [self.record.clone()],
                }],
            }],
        })
    }
}

/// Lazily flatten an export envelope into per-record events.
///
/// Blocks of the wrong shape at any level are skipped rather than rejected.
pub fn flatten(payload: &Value) -> impl Iterator<Item = FlatEvent<'_>> {
    array_at(payload, &RESOURCE_LOGS_KEYS)
        .iter()
        .flat_map(|resource| {
            array_at(resource, &SCOPE_LOGS_KEYS)
                .iter()
                .flat_map(move |scope| {
                    array_at(scope, &LOG_RECORDS_KEYS)
                        .iter()
                        .filter(|record| record.is_object())
                        .map(move |record| FlatEvent::build(resource, scope, record))
                })
        })
}

fn first_key<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .find_map(|key| value.get(*key).filter(|v| !v.is_null()))
}

fn array_at<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| value.get(*key).and_then(Value::as_array))
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
