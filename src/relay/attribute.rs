//! OTLP `AnyValue` decoding
//!
//! OTLP/JSON wraps every attribute value in a single-key object naming its
//! variant (`{"stringValue": "x"}`, `{"kvlistValue": {"values": [...]}}`).
//! Exporters disagree on casing, so both camelCase and snake_case slot names
//! are accepted. Decoding never fails: a shape we do not recognise is carried
//! through untouched.

use serde_json::{Map, Number, Value};

const STRING_SLOTS: [&str; 2] = ["stringValue", "string_value"];
const BOOL_SLOTS: [&str; 2] = ["boolValue", "bool_value"];
const INT_SLOTS: [&str; 2] = ["intValue", "int_value"];
const DOUBLE_SLOTS: [&str; 2] = ["doubleValue", "double_value"];
const BYTES_SLOTS: [&str; 2] = ["bytesValue", "bytes_value"];
const ARRAY_SLOTS: [&str; 2] = ["arrayValue", "array_value"];
const KVLIST_SLOTS: [&str; 2] = ["kvlistValue", "kvlist_value"];

/// Decoded attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// `stringValue`
    String(String),
    /// `boolValue`
    Bool(bool),
    /// `intValue` (OTLP/JSON sends int64 as a decimal string or a number)
    Int(i64),
    /// `doubleValue`
    Double(f64),
    /// `bytesValue`, kept as the base64 text the exporter sent
    Bytes(String),
    /// `arrayValue`
    Array(Vec<AttributeValue>),
    /// `kvlistValue`, entries in wire order
    Map(Vec<(String, AttributeValue)>),
    /// Anything else, passed through unchanged
    Raw(Value),
}

impl AttributeValue {
    /// Decode one wire value.
    pub fn from_wire(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            return AttributeValue::Raw(value.clone());
        };

        if let Some(inner) = slot(object, &STRING_SLOTS) {
            return match inner {
                Value::String(s) => AttributeValue::String(s.clone()),
                other => AttributeValue::Raw(other.clone()),
            };
        }

        if let Some(inner) = slot(object, &BOOL_SLOTS) {
            return match inner {
                Value::Bool(b) => AttributeValue::Bool(*b),
                other => AttributeValue::Raw(other.clone()),
            };
        }

        if let Some(inner) = slot(object, &INT_SLOTS) {
            return decode_int(inner);
        }

        if let Some(inner) = slot(object, &DOUBLE_SLOTS) {
            return match inner.as_f64() {
                Some(f) if inner.is_number() => AttributeValue::Double(f),
                _ => AttributeValue::Raw(inner.clone()),
            };
        }

        if let Some(inner) = slot(object, &BYTES_SLOTS) {
            return match inner {
                Value::String(s) => AttributeValue::Bytes(s.clone()),
                other => AttributeValue::Raw(other.clone()),
            };
        }

        if let Some(values) = slot(object, &ARRAY_SLOTS).and_then(wrapped_values) {
            return AttributeValue::Array(values.iter().map(AttributeValue::from_wire).collect());
        }

        if let Some(entries) = slot(object, &KVLIST_SLOTS).and_then(wrapped_values) {
            let pairs = entries
                .iter()
                .filter_map(Value::as_object)
                .filter_map(|entry| {
                    let key = entry.get("key").and_then(Value::as_str)?;
                    let value = entry.get("value").unwrap_or(&Value::Null);
                    Some((key.to_string(), AttributeValue::from_wire(value)))
                })
                .collect();
            return AttributeValue::Map(pairs);
        }

        AttributeValue::Raw(value.clone())
    }

    /// Convert into a plain JSON value.
    pub fn into_json(self) -> Value {
        match self {
            AttributeValue::String(s) | AttributeValue::Bytes(s) => Value::String(s),
            AttributeValue::Bool(b) => Value::Bool(b),
            AttributeValue::Int(i) => Value::Number(i.into()),
            AttributeValue::Double(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
            AttributeValue::Array(items) => {
                Value::Array(items.into_iter().map(AttributeValue::into_json).collect())
            }
            AttributeValue::Map(pairs) => Value::Object(
                pairs
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect(),
            ),
            AttributeValue::Raw(value) => value,
        }
    }
}

/// Decode a wire value straight into its native JSON form.
pub fn decode_any(value: &Value) -> Value {
    AttributeValue::from_wire(value).into_json()
}

/// Decode an OTLP attribute list (`[{"key": .., "value": ..}, ..]`) into a map.
///
/// Entries may name their key with `name` instead of `key`; entries with
/// neither are skipped. A non-array input yields an empty map.
pub fn decode_attributes(list: Option<&Value>) -> Map<String, Value> {
    let mut out = Map::new();
    let Some(items) = list.and_then(Value::as_array) else {
        return out;
    };

    for item in items {
        let Some(item) = item.as_object() else {
            continue;
        };
        let key = item
            .get("key")
            .or_else(|| item.get("name"))
            .and_then(Value::as_str)
            .filter(|key| !key.is_empty());
        if let Some(key) = key {
            out.insert(
                key.to_string(),
                decode_any(item.get("value").unwrap_or(&Value::Null)),
            );
        }
    }

    out
}

fn slot<'a>(object: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| object.get(*name))
}

fn wrapped_values(inner: &Value) -> Option<&[Value]> {
    let object = inner.as_object()?;
    match object.get("values") {
        Some(Value::Array(values)) => Some(values.as_slice()),
        // protobuf JSON omits empty repeated fields
        None => Some(&[][..]),
        Some(_) => None,
    }
}

fn decode_int(inner: &Value) -> AttributeValue {
    match inner {
        Value::Number(n) => n
            .as_i64()
            .map(AttributeValue::Int)
            .unwrap_or_else(|| AttributeValue::Raw(inner.clone())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(AttributeValue::Int)
            .unwrap_or_else(|_| AttributeValue::String(s.clone())),
        other => AttributeValue::Raw(other.clone()),
    }
}
