//! OTLP trace request decoder
//!
//! Parses `ExportTraceServiceRequest` protobuf bytes straight off the wire
//! into the borrowed tree in [`model`]. Each message has its own parser
//! over a bounded [`WireReader`]; a field is only interpreted when both its
//! number and wire type match the schema, everything else is skipped, so
//! newer producers with extra fields decode cleanly.
//!
//! Field numbers follow `opentelemetry/proto/trace/v1/trace.proto` and
//! `opentelemetry/proto/common/v1/common.proto`.
//!
//! OTLP/JSON bodies go through [`json`] and end up in the same tree.

mod json;
mod model;
mod reader;

pub use json::{JsonExportRequest, parse_json_request};
pub use model::{
    AnyValue, Event, ExportRequest, KeyValue, ResourceSpans, Scope, ScopeSpans, Span, Status,
};
pub use reader::{WireReader, WireType};

use thiserror::Error;

/// Nesting limit for array / kvlist values
const MAX_VALUE_DEPTH: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("buffer truncated at offset {offset}")]
    Truncated { offset: usize },

    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    #[error("unsupported wire type {wire_type} at offset {offset}")]
    UnsupportedWireType { wire_type: u8, offset: usize },

    #[error("invalid field number at offset {offset}")]
    InvalidFieldNumber { offset: usize },

    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("attribute values nested deeper than {max} levels")]
    TooDeep { max: usize },

    #[error("invalid OTLP/JSON: {0}")]
    InvalidJson(String),
}

/// Decode a binary `ExportTraceServiceRequest`
pub fn decode_export_request(buf: &[u8]) -> Result<ExportRequest<'_>, DecodeError> {
    let mut r = WireReader::new(buf);
    let mut request = ExportRequest::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => request
                .resource_spans
                .push(parse_resource_spans(r.read_message()?)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(request)
}

fn parse_resource_spans(mut r: WireReader<'_>) -> Result<ResourceSpans<'_>, DecodeError> {
    let mut out = ResourceSpans::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => parse_resource(r.read_message()?, &mut out.resource_attributes)?,
            (2, WireType::Len) => out.scope_spans.push(parse_scope_spans(r.read_message()?)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(out)
}

fn parse_resource<'a>(
    mut r: WireReader<'a>,
    attributes: &mut Vec<KeyValue<'a>>,
) -> Result<(), DecodeError> {
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => attributes.push(parse_key_value(r.read_message()?, 0)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(())
}

fn parse_scope_spans(mut r: WireReader<'_>) -> Result<ScopeSpans<'_>, DecodeError> {
    let mut out = ScopeSpans::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => out.scope = Some(parse_scope(r.read_message()?)?),
            (2, WireType::Len) => out.spans.push(parse_span(r.read_message()?)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(out)
}

fn parse_scope(mut r: WireReader<'_>) -> Result<Scope<'_>, DecodeError> {
    let mut scope = Scope::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => scope.name = r.read_str()?,
            (2, WireType::Len) => scope.version = r.read_str()?,
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(scope)
}

fn parse_span(mut r: WireReader<'_>) -> Result<Span<'_>, DecodeError> {
    let mut span = Span::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => span.trace_id = hex::encode(r.read_bytes()?),
            (2, WireType::Len) => span.span_id = hex::encode(r.read_bytes()?),
            (3, WireType::Len) => span.trace_state = r.read_str()?,
            (4, WireType::Len) => span.parent_span_id = hex::encode(r.read_bytes()?),
            (5, WireType::Len) => span.name = r.read_str()?,
            (6, WireType::Varint) => span.kind = r.read_varint()? as i32,
            (7, WireType::Fixed64) => span.start_time_unix_nano = r.read_fixed64()?,
            (8, WireType::Fixed64) => span.end_time_unix_nano = r.read_fixed64()?,
            (9, WireType::Len) => span.attributes.push(parse_key_value(r.read_message()?, 0)?),
            (11, WireType::Len) => span.events.push(parse_event(r.read_message()?)?),
            (15, WireType::Len) => span.status = Some(parse_status(r.read_message()?)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(span)
}

fn parse_event(mut r: WireReader<'_>) -> Result<Event<'_>, DecodeError> {
    let mut event = Event::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Fixed64) => event.time_unix_nano = r.read_fixed64()?,
            (2, WireType::Len) => event.name = r.read_str()?,
            (3, WireType::Len) => event.attributes.push(parse_key_value(r.read_message()?, 0)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(event)
}

fn parse_status(mut r: WireReader<'_>) -> Result<Status<'_>, DecodeError> {
    let mut status = Status::default();
    while !r.is_empty() {
        match r.read_tag()? {
            (2, WireType::Len) => status.message = r.read_str()?,
            (3, WireType::Varint) => status.code = r.read_varint()? as i32,
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(status)
}

fn parse_key_value(mut r: WireReader<'_>, depth: usize) -> Result<KeyValue<'_>, DecodeError> {
    let mut key = "";
    let mut value = None;
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => key = r.read_str()?,
            (2, WireType::Len) => value = parse_any_value(r.read_message()?, depth)?,
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(KeyValue { key, value })
}

/// Decode an `AnyValue`; `None` when no oneof variant is present.
/// If several variants appear, the last one wins.
fn parse_any_value(mut r: WireReader<'_>, depth: usize) -> Result<Option<AnyValue<'_>>, DecodeError> {
    if depth >= MAX_VALUE_DEPTH {
        return Err(DecodeError::TooDeep {
            max: MAX_VALUE_DEPTH,
        });
    }
    let mut value = None;
    while !r.is_empty() {
        value = match r.read_tag()? {
            (1, WireType::Len) => Some(AnyValue::String(r.read_str()?)),
            (2, WireType::Varint) => Some(AnyValue::Bool(r.read_varint()? != 0)),
            // int64: two's complement varint, not zigzag
            (3, WireType::Varint) => Some(AnyValue::Int(r.read_varint()? as i64)),
            (4, WireType::Fixed64) => Some(AnyValue::Double(r.read_double()?)),
            (5, WireType::Len) => Some(AnyValue::Array(parse_array(r.read_message()?, depth + 1)?)),
            (6, WireType::Len) => {
                Some(AnyValue::KvList(parse_kv_list(r.read_message()?, depth + 1)?))
            }
            (7, WireType::Len) => Some(AnyValue::Bytes(r.read_bytes()?)),
            (_, wire) => {
                r.skip(wire)?;
                continue;
            }
        };
    }
    Ok(value)
}

fn parse_array(mut r: WireReader<'_>, depth: usize) -> Result<Vec<AnyValue<'_>>, DecodeError> {
    let mut values = Vec::new();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => {
                if let Some(v) = parse_any_value(r.read_message()?, depth)? {
                    values.push(v);
                }
            }
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(values)
}

fn parse_kv_list(mut r: WireReader<'_>, depth: usize) -> Result<Vec<KeyValue<'_>>, DecodeError> {
    let mut values = Vec::new();
    while !r.is_empty() {
        match r.read_tag()? {
            (1, WireType::Len) => values.push(parse_key_value(r.read_message()?, depth)?),
            (_, wire) => r.skip(wire)?,
        }
    }
    Ok(values)
}
