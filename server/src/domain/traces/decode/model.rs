//! Decoded OTLP trace tree
//!
//! Strings and byte payloads borrow from the request buffer (or from the
//! parsed OTLP/JSON document); only the span identifiers are materialized,
//! as lowercase hex.

/// `ExportTraceServiceRequest`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ExportRequest<'a> {
    pub resource_spans: Vec<ResourceSpans<'a>>,
}

impl ExportRequest<'_> {
    pub fn span_count(&self) -> usize {
        self.resource_spans
            .iter()
            .flat_map(|rs| &rs.scope_spans)
            .map(|ss| ss.spans.len())
            .sum()
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResourceSpans<'a> {
    /// Attributes of the `Resource` message
    pub resource_attributes: Vec<KeyValue<'a>>,
    pub scope_spans: Vec<ScopeSpans<'a>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScopeSpans<'a> {
    pub scope: Option<Scope<'a>>,
    pub spans: Vec<Span<'a>>,
}

/// `InstrumentationScope`
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Scope<'a> {
    pub name: &'a str,
    pub version: &'a str,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Span<'a> {
    pub trace_id: String,
    pub span_id: String,
    /// Empty for root spans
    pub parent_span_id: String,
    pub trace_state: &'a str,
    pub name: &'a str,
    pub kind: i32,
    pub start_time_unix_nano: u64,
    pub end_time_unix_nano: u64,
    pub attributes: Vec<KeyValue<'a>>,
    pub events: Vec<Event<'a>>,
    pub status: Option<Status<'a>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Event<'a> {
    pub time_unix_nano: u64,
    pub name: &'a str,
    pub attributes: Vec<KeyValue<'a>>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Status<'a> {
    pub message: &'a str,
    pub code: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyValue<'a> {
    pub key: &'a str,
    /// `None` when the value message is absent or has no variant set
    pub value: Option<AnyValue<'a>>,
}

/// The `AnyValue` oneof
#[derive(Debug, Clone, PartialEq)]
pub enum AnyValue<'a> {
    String(&'a str),
    Bool(bool),
    Int(i64),
    Double(f64),
    /// Elements without a variant are dropped
    Array(Vec<AnyValue<'a>>),
    KvList(Vec<KeyValue<'a>>),
    Bytes(&'a [u8]),
}
