//! Decoded spans to storage rows
//!
//! - `semconv` - deprecated attribute key renames
//! - `genai` - GenAI column extraction with legacy fallbacks
//! - `values` - attribute values as JSON
//!
//! Normalization never fails: missing or garbled attributes leave the
//! corresponding columns empty.

mod genai;
mod semconv;
mod values;

pub use genai::{GenAiFields, take_genai};
pub use semconv::SemconvTable;

use serde_json::{Map, Value as JsonValue, json};

use crate::data::types::{SpanBatch, SpanKind, SpanRow, StatusCode};
use crate::domain::traces::decode::{AnyValue, ExportRequest, KeyValue, Scope, Span};

use values::{extend_map, key_values_to_map};

pub(crate) mod keys {
    pub const SERVICE_NAME: &str = "service.name";
    pub const SESSION_ID: &str = "session.id";
    pub const CONVERSATION_ID: &str = "gen_ai.conversation.id";
    pub const SCOPE_NAME: &str = "otel.scope.name";
    pub const SCOPE_VERSION: &str = "otel.scope.version";
}

const UNKNOWN_SERVICE: &str = "unknown";

/// Hex length of a 16-byte trace id
const TRACE_ID_HEX_LEN: usize = 32;
/// Hex length of an 8-byte span id
const SPAN_ID_HEX_LEN: usize = 16;

/// Per-resource state shared by all of its spans
struct ResourceContext {
    service_name: String,
    /// Resource attributes except `service.name`
    attributes: Map<String, JsonValue>,
}

impl ResourceContext {
    fn new(attrs: &[KeyValue<'_>]) -> Self {
        let service_name = attrs
            .iter()
            .rev()
            .find(|kv| kv.key == keys::SERVICE_NAME)
            .and_then(|kv| match &kv.value {
                Some(AnyValue::String(s)) if !s.is_empty() => Some(s.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| UNKNOWN_SERVICE.to_string());
        let mut attributes = key_values_to_map(attrs);
        attributes.remove(keys::SERVICE_NAME);
        Self {
            service_name,
            attributes,
        }
    }
}

/// Flatten every span of a request into rows.
///
/// Spans whose trace id is not 16 bytes or whose span id is not 8 bytes
/// cannot be keyed and are skipped.
pub fn normalize_request(request: &ExportRequest<'_>, semconv: &SemconvTable) -> SpanBatch {
    let mut batch = Vec::with_capacity(request.span_count());
    let mut skipped = 0usize;
    let mut genai = 0usize;
    for resource_spans in &request.resource_spans {
        let resource = ResourceContext::new(&resource_spans.resource_attributes);
        for scope_spans in &resource_spans.scope_spans {
            for span in &scope_spans.spans {
                if !has_valid_ids(span) {
                    tracing::debug!(
                        name = span.name,
                        trace_id = %span.trace_id,
                        span_id = %span.span_id,
                        "Skipping span with invalid trace/span id"
                    );
                    skipped += 1;
                    continue;
                }
                let (row, is_genai) =
                    normalize_span(span, &resource, scope_spans.scope.as_ref(), semconv);
                genai += usize::from(is_genai);
                batch.push(row);
            }
        }
    }
    tracing::debug!(spans = batch.len(), genai, skipped, "Normalized export request");
    batch
}

fn has_valid_ids(span: &Span<'_>) -> bool {
    span.trace_id.len() == TRACE_ID_HEX_LEN && span.span_id.len() == SPAN_ID_HEX_LEN
}

fn normalize_span(
    span: &Span<'_>,
    resource: &ResourceContext,
    scope: Option<&Scope<'_>>,
    semconv: &SemconvTable,
) -> (SpanRow, bool) {
    // Resource first so span attributes win on collision
    let mut attrs = resource.attributes.clone();
    extend_map(&mut attrs, &span.attributes);
    semconv.apply(&mut attrs);

    let genai = take_genai(&mut attrs);
    let is_genai = genai.is_genai();
    let session_id = session_id(&attrs);

    attrs.remove(keys::SESSION_ID);
    if let Some(scope) = scope {
        insert_if_absent(&mut attrs, keys::SCOPE_NAME, scope.name);
        insert_if_absent(&mut attrs, keys::SCOPE_VERSION, scope.version);
    }

    let status = span.status.as_ref();
    let row = SpanRow {
        trace_id: span.trace_id.clone(),
        span_id: span.span_id.clone(),
        parent_span_id: (span.parent_span_id.len() == SPAN_ID_HEX_LEN)
            .then(|| span.parent_span_id.clone()),
        trace_state: non_empty(span.trace_state),
        name: span.name.to_string(),
        kind: SpanKind::from_otlp(span.kind),
        start_time_unix_nano: span.start_time_unix_nano,
        end_time_unix_nano: span.end_time_unix_nano,
        duration_ns: span
            .end_time_unix_nano
            .saturating_sub(span.start_time_unix_nano),
        status_code: status.map_or(StatusCode::Unset, |s| StatusCode::from_otlp(s.code)),
        status_message: status.and_then(|s| non_empty(s.message)),
        service_name: resource.service_name.clone(),
        session_id,
        gen_ai_system: genai.system,
        gen_ai_request_model: genai.request_model,
        gen_ai_response_model: genai.response_model,
        gen_ai_input_tokens: genai.input_tokens,
        gen_ai_output_tokens: genai.output_tokens,
        gen_ai_cost_usd: genai.cost_usd,
        gen_ai_tool_name: genai.tool_name,
        attributes_json: JsonValue::Object(attrs).to_string(),
        events_json: events_json(span),
    };
    (row, is_genai)
}

fn session_id(attrs: &Map<String, JsonValue>) -> Option<String> {
    [keys::SESSION_ID, keys::CONVERSATION_ID]
        .iter()
        .find_map(|k| match attrs.get(*k) {
            Some(JsonValue::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(JsonValue::Number(n)) => Some(n.to_string()),
            _ => None,
        })
}

fn events_json(span: &Span<'_>) -> Option<String> {
    if span.events.is_empty() {
        return None;
    }
    let events: Vec<JsonValue> = span
        .events
        .iter()
        .map(|e| {
            json!({
                "name": e.name,
                "time_unix_nano": e.time_unix_nano,
                "attributes": key_values_to_map(&e.attributes),
            })
        })
        .collect();
    Some(JsonValue::Array(events).to_string())
}

fn insert_if_absent(attrs: &mut Map<String, JsonValue>, key: &str, value: &str) {
    if !value.is_empty() && !attrs.contains_key(key) {
        attrs.insert(key.to_string(), json!(value));
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
