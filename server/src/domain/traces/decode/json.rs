//! OTLP/JSON trace request decoder
//!
//! The protobuf JSON mapping of `ExportTraceServiceRequest` is deserialized
//! into owned [`JsonExportRequest`] documents, then lent out as the same
//! [`ExportRequest`] tree the binary decoder produces. Field names are
//! lowerCamelCase with the proto names accepted as aliases.
//!
//! Mapping rules:
//! - ids are hex strings; anything that is not valid hex becomes empty
//! - 64-bit integers and timestamps may be JSON numbers or decimal strings
//! - `bytesValue` is base64
//! - `kind` and `status.code` may be numbers or enum names

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::de::{self, Deserializer};

use super::{
    AnyValue, DecodeError, Event, ExportRequest, KeyValue, MAX_VALUE_DEPTH, ResourceSpans, Scope,
    ScopeSpans, Span, Status,
};

/// Owned OTLP/JSON export request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JsonExportRequest {
    #[serde(alias = "resource_spans")]
    resource_spans: Vec<JsonResourceSpans>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonResourceSpans {
    resource: Option<JsonResource>,
    #[serde(alias = "scope_spans")]
    scope_spans: Vec<JsonScopeSpans>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonResource {
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonScopeSpans {
    scope: Option<JsonScope>,
    spans: Vec<JsonSpan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonScope {
    name: String,
    version: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonSpan {
    #[serde(alias = "trace_id")]
    trace_id: String,
    #[serde(alias = "span_id")]
    span_id: String,
    #[serde(alias = "parent_span_id")]
    parent_span_id: String,
    #[serde(alias = "trace_state")]
    trace_state: String,
    name: String,
    #[serde(deserialize_with = "span_kind")]
    kind: i32,
    #[serde(alias = "start_time_unix_nano", deserialize_with = "lenient_u64")]
    start_time_unix_nano: u64,
    #[serde(alias = "end_time_unix_nano", deserialize_with = "lenient_u64")]
    end_time_unix_nano: u64,
    attributes: Vec<JsonKeyValue>,
    events: Vec<JsonEvent>,
    status: Option<JsonStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonEvent {
    #[serde(alias = "time_unix_nano", deserialize_with = "lenient_u64")]
    time_unix_nano: u64,
    name: String,
    attributes: Vec<JsonKeyValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonStatus {
    message: String,
    #[serde(deserialize_with = "status_code")]
    code: i32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct JsonKeyValue {
    key: String,
    value: Option<JsonAnyValue>,
}

/// The `AnyValue` oneof as a struct of optional members
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct JsonAnyValue {
    #[serde(alias = "string_value")]
    string_value: Option<String>,
    #[serde(alias = "bool_value")]
    bool_value: Option<bool>,
    #[serde(alias = "int_value", deserialize_with = "lenient_i64")]
    int_value: Option<i64>,
    #[serde(alias = "double_value", deserialize_with = "lenient_f64")]
    double_value: Option<f64>,
    #[serde(alias = "array_value")]
    array_value: Option<JsonValues<JsonAnyValue>>,
    #[serde(alias = "kvlist_value")]
    kvlist_value: Option<JsonValues<JsonKeyValue>>,
    #[serde(alias = "bytes_value", deserialize_with = "base64_bytes")]
    bytes_value: Option<Vec<u8>>,
}

/// `ArrayValue` and `KeyValueList` share the `values` shape
#[derive(Debug, Deserialize)]
struct JsonValues<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
}

/// Parse an OTLP/JSON body. Unknown fields are ignored.
pub fn parse_json_request(buf: &[u8]) -> Result<JsonExportRequest, DecodeError> {
    serde_json::from_slice(buf).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

impl JsonExportRequest {
    /// Borrow the decoded tree
    pub fn tree(&self) -> Result<ExportRequest<'_>, DecodeError> {
        let resource_spans = self
            .resource_spans
            .iter()
            .map(JsonResourceSpans::tree)
            .collect::<Result<_, _>>()?;
        Ok(ExportRequest { resource_spans })
    }
}

impl JsonResourceSpans {
    fn tree(&self) -> Result<ResourceSpans<'_>, DecodeError> {
        let resource_attributes = match &self.resource {
            Some(resource) => key_values(&resource.attributes, 0)?,
            None => Vec::new(),
        };
        let scope_spans = self
            .scope_spans
            .iter()
            .map(|ss| {
                Ok(ScopeSpans {
                    scope: ss.scope.as_ref().map(|s| Scope {
                        name: &s.name,
                        version: &s.version,
                    }),
                    spans: ss.spans.iter().map(JsonSpan::tree).collect::<Result<_, _>>()?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        Ok(ResourceSpans {
            resource_attributes,
            scope_spans,
        })
    }
}

impl JsonSpan {
    fn tree(&self) -> Result<Span<'_>, DecodeError> {
        let events = self
            .events
            .iter()
            .map(|e| {
                Ok(Event {
                    time_unix_nano: e.time_unix_nano,
                    name: &e.name,
                    attributes: key_values(&e.attributes, 0)?,
                })
            })
            .collect::<Result<_, DecodeError>>()?;
        Ok(Span {
            trace_id: normalize_id(&self.trace_id),
            span_id: normalize_id(&self.span_id),
            parent_span_id: normalize_id(&self.parent_span_id),
            trace_state: &self.trace_state,
            name: &self.name,
            kind: self.kind,
            start_time_unix_nano: self.start_time_unix_nano,
            end_time_unix_nano: self.end_time_unix_nano,
            attributes: key_values(&self.attributes, 0)?,
            events,
            status: self.status.as_ref().map(|s| Status {
                message: &s.message,
                code: s.code,
            }),
        })
    }
}

/// Lowercase hex of a hex id; empty when the input is not hex
fn normalize_id(id: &str) -> String {
    hex::decode(id.trim()).map(hex::encode).unwrap_or_default()
}

fn key_values(kvs: &[JsonKeyValue], depth: usize) -> Result<Vec<KeyValue<'_>>, DecodeError> {
    kvs.iter()
        .map(|kv| {
            let value = match &kv.value {
                Some(v) => any_value(v, depth)?,
                None => None,
            };
            Ok(KeyValue {
                key: &kv.key,
                value,
            })
        })
        .collect()
}

/// `None` when no member is set
fn any_value(value: &JsonAnyValue, depth: usize) -> Result<Option<AnyValue<'_>>, DecodeError> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(DecodeError::TooDeep {
            max: MAX_VALUE_DEPTH,
        });
    }
    if let Some(s) = &value.string_value {
        return Ok(Some(AnyValue::String(s)));
    }
    if let Some(b) = value.bool_value {
        return Ok(Some(AnyValue::Bool(b)));
    }
    if let Some(i) = value.int_value {
        return Ok(Some(AnyValue::Int(i)));
    }
    if let Some(d) = value.double_value {
        return Ok(Some(AnyValue::Double(d)));
    }
    if let Some(array) = &value.array_value {
        let mut values = Vec::with_capacity(array.values.len());
        for element in &array.values {
            if let Some(v) = any_value(element, depth + 1)? {
                values.push(v);
            }
        }
        return Ok(Some(AnyValue::Array(values)));
    }
    if let Some(kvlist) = &value.kvlist_value {
        return Ok(Some(AnyValue::KvList(key_values(&kvlist.values, depth + 1)?)));
    }
    Ok(value.bytes_value.as_deref().map(AnyValue::Bytes))
}

/// A JSON number or its decimal string form
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Option::<NumberOrString<u64>>::deserialize(d)? {
        None => Ok(0),
        Some(NumberOrString::Number(n)) => Ok(n),
        Some(NumberOrString::String(s)) => s.trim().parse().map_err(de::Error::custom),
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<NumberOrString<i64>>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

/// Also accepts `"NaN"`, `"Infinity"` and `"-Infinity"`
fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    match Option::<NumberOrString<f64>>::deserialize(d)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
    }
}

fn base64_bytes<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(s) => BASE64.decode(s.trim()).map(Some).map_err(de::Error::custom),
    }
}

fn span_kind<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    enum_value(d, |name| match name {
        "SPAN_KIND_INTERNAL" => 1,
        "SPAN_KIND_SERVER" => 2,
        "SPAN_KIND_CLIENT" => 3,
        "SPAN_KIND_PRODUCER" => 4,
        "SPAN_KIND_CONSUMER" => 5,
        _ => 0,
    })
}

fn status_code<'de, D: Deserializer<'de>>(d: D) -> Result<i32, D::Error> {
    enum_value(d, |name| match name {
        "STATUS_CODE_OK" => 1,
        "STATUS_CODE_ERROR" => 2,
        _ => 0,
    })
}

/// Proto enum as its number or its name; unknown names map to 0
fn enum_value<'de, D: Deserializer<'de>>(d: D, by_name: fn(&str) -> i32) -> Result<i32, D::Error> {
    match Option::<NumberOrString<i32>>::deserialize(d)? {
        None => Ok(0),
        Some(NumberOrString::Number(n)) => Ok(n),
        Some(NumberOrString::String(s)) => Ok(s.trim().parse().unwrap_or_else(|_| by_name(s.trim()))),
    }
}
