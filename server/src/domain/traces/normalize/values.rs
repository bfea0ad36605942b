//! Decoded attribute values as JSON

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value as JsonValue, json};

use crate::domain::traces::decode::{AnyValue, KeyValue};

/// Convert AnyValue to JSON value (preserves native types, bytes as base64)
pub fn any_value_to_json(value: &AnyValue<'_>) -> JsonValue {
    match value {
        AnyValue::String(s) => json!(s),
        AnyValue::Bool(b) => json!(b),
        AnyValue::Int(i) => json!(i),
        // NaN / infinity have no JSON form and become null
        AnyValue::Double(d) => json!(d),
        AnyValue::Array(values) => JsonValue::Array(values.iter().map(any_value_to_json).collect()),
        AnyValue::KvList(values) => JsonValue::Object(key_values_to_map(values)),
        AnyValue::Bytes(b) => json!(BASE64.encode(b)),
    }
}

/// Build a JSON map from key/value pairs; later keys win, absent values and
/// empty keys are skipped
pub fn key_values_to_map(attrs: &[KeyValue<'_>]) -> Map<String, JsonValue> {
    let mut map = Map::new();
    extend_map(&mut map, attrs);
    map
}

pub fn extend_map(map: &mut Map<String, JsonValue>, attrs: &[KeyValue<'_>]) {
    for kv in attrs {
        if kv.key.is_empty() {
            continue;
        }
        if let Some(value) = &kv.value {
            map.insert(kv.key.to_string(), any_value_to_json(value));
        }
    }
}
