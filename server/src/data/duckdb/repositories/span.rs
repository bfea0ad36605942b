//! Span repository: keyed upserts and read queries

use std::collections::HashMap;

use duckdb::types::Value;
use duckdb::{Connection, Row, params, params_from_iter};

use crate::core::constants::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use crate::data::duckdb::schema::SPAN_COLUMNS;
use crate::data::duckdb::{DuckdbError, in_transaction};
use crate::data::types::{SpanFilter, SpanKind, SpanRow, StatusCode};

/// Columns overwritten when a key already exists
const UPSERT_SET: &str = "parent_span_id = excluded.parent_span_id, \
    trace_state = excluded.trace_state, \
    start_time_unix_nano = excluded.start_time_unix_nano, \
    end_time_unix_nano = excluded.end_time_unix_nano, \
    duration_ns = excluded.duration_ns, \
    name = excluded.name, \
    kind = excluded.kind, \
    status_code = excluded.status_code, \
    status_message = excluded.status_message, \
    service_name = excluded.service_name, \
    session_id = excluded.session_id, \
    gen_ai_system = excluded.gen_ai_system, \
    gen_ai_request_model = excluded.gen_ai_request_model, \
    gen_ai_response_model = excluded.gen_ai_response_model, \
    gen_ai_input_tokens = excluded.gen_ai_input_tokens, \
    gen_ai_output_tokens = excluded.gen_ai_output_tokens, \
    gen_ai_cost_usd = excluded.gen_ai_cost_usd, \
    gen_ai_tool_name = excluded.gen_ai_tool_name, \
    attributes_json = excluded.attributes_json, \
    events_json = excluded.events_json";

/// Upsert a batch in one transaction; all rows commit or none do
pub fn upsert_batch(conn: &Connection, rows: &[SpanRow]) -> Result<usize, DuckdbError> {
    if rows.is_empty() {
        return Ok(0);
    }
    in_transaction(conn, |conn| upsert_rows(conn, rows))
}

/// Upsert rows on the caller's transaction.
///
/// Duplicate keys inside `rows` collapse to the last occurrence before
/// touching the table.
pub fn upsert_rows(conn: &Connection, rows: &[SpanRow]) -> Result<usize, DuckdbError> {
    let sql = format!(
        "INSERT INTO spans ({SPAN_COLUMNS}) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
         ON CONFLICT (trace_id, span_id) DO UPDATE SET {UPSERT_SET}"
    );
    let mut stmt = conn.prepare_cached(&sql)?;

    let mut written = 0;
    for row in last_per_key(rows) {
        // Column order must match SPAN_COLUMNS
        stmt.execute(params![
            row.trace_id.as_str(),
            row.span_id.as_str(),
            row.parent_span_id.as_deref(),
            row.trace_state.as_deref(),
            row.start_time_unix_nano,
            row.end_time_unix_nano,
            row.duration_ns,
            row.name.as_str(),
            row.kind.as_str(),
            row.status_code.as_str(),
            row.status_message.as_deref(),
            row.service_name.as_str(),
            row.session_id.as_deref(),
            row.gen_ai_system.as_deref(),
            row.gen_ai_request_model.as_deref(),
            row.gen_ai_response_model.as_deref(),
            row.gen_ai_input_tokens,
            row.gen_ai_output_tokens,
            row.gen_ai_cost_usd,
            row.gen_ai_tool_name.as_deref(),
            row.attributes_json.as_str(),
            row.events_json.as_deref(),
        ])?;
        written += 1;
    }
    Ok(written)
}

/// Rows in input order, keeping only the last occurrence of each key
fn last_per_key(rows: &[SpanRow]) -> impl Iterator<Item = &SpanRow> {
    let mut last: HashMap<(&str, &str), usize> = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        last.insert((row.trace_id.as_str(), row.span_id.as_str()), i);
    }
    rows.iter()
        .enumerate()
        .filter(move |(i, row)| last.get(&(row.trace_id.as_str(), row.span_id.as_str())) == Some(i))
        .map(|(_, row)| row)
}

/// All spans of a trace, oldest first
pub fn get_trace(conn: &Connection, trace_id: &str) -> Result<Vec<SpanRow>, DuckdbError> {
    let sql = format!(
        "SELECT {SPAN_COLUMNS} FROM spans WHERE trace_id = ? \
         ORDER BY start_time_unix_nano, span_id"
    );
    execute_span_query(conn, &sql, &[Value::Text(trace_id.to_string())])
}

/// All spans of a session, oldest first
pub fn get_session_spans(conn: &Connection, session_id: &str) -> Result<Vec<SpanRow>, DuckdbError> {
    let sql = format!(
        "SELECT {SPAN_COLUMNS} FROM spans WHERE session_id = ? \
         ORDER BY start_time_unix_nano, trace_id, span_id"
    );
    execute_span_query(conn, &sql, &[Value::Text(session_id.to_string())])
}

/// Spans matching every set filter, newest first, capped at the filter limit
pub fn query_spans(conn: &Connection, filter: &SpanFilter) -> Result<Vec<SpanRow>, DuckdbError> {
    let mut conditions: Vec<&str> = Vec::new();
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(ref service) = filter.service_name {
        conditions.push("service_name = ?");
        bind_values.push(Value::Text(service.clone()));
    }
    if let Some(ref system) = filter.gen_ai_system {
        conditions.push("gen_ai_system = ?");
        bind_values.push(Value::Text(system.clone()));
    }
    if let Some(status) = filter.status_code {
        conditions.push("status_code = ?");
        bind_values.push(Value::Text(status.as_str().to_string()));
    }
    push_time_window(
        &mut conditions,
        &mut bind_values,
        filter.start_after,
        filter.start_before,
    );

    let limit = filter
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_QUERY_LIMIT);
    let sql = format!(
        "SELECT {SPAN_COLUMNS} FROM spans{} \
         ORDER BY start_time_unix_nano DESC, trace_id, span_id LIMIT {limit}",
        where_clause(&conditions)
    );
    execute_span_query(conn, &sql, &bind_values)
}

/// Half-open start-time window shared with the stats queries
pub(crate) fn push_time_window(
    conditions: &mut Vec<&str>,
    bind_values: &mut Vec<Value>,
    start_after: Option<u64>,
    start_before: Option<u64>,
) {
    if let Some(after) = start_after {
        conditions.push("start_time_unix_nano >= ?");
        bind_values.push(Value::UBigInt(after));
    }
    if let Some(before) = start_before {
        conditions.push("start_time_unix_nano < ?");
        bind_values.push(Value::UBigInt(before));
    }
}

pub(crate) fn where_clause(conditions: &[&str]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

fn execute_span_query(
    conn: &Connection,
    sql: &str,
    bind_values: &[Value],
) -> Result<Vec<SpanRow>, DuckdbError> {
    let mut stmt = conn.prepare(sql)?;
    let mut query_rows = stmt.query(params_from_iter(bind_values.iter()))?;
    let mut rows = vec![];

    while let Some(row) = query_rows.next()? {
        rows.push(row_to_span(row)?);
    }

    Ok(rows)
}

fn row_to_span(row: &Row<'_>) -> Result<SpanRow, DuckdbError> {
    let kind: String = row.get(8)?;
    let status_code: String = row.get(9)?;

    Ok(SpanRow {
        trace_id: row.get(0)?,
        span_id: row.get(1)?,
        parent_span_id: row.get(2)?,
        trace_state: row.get(3)?,
        start_time_unix_nano: row.get(4)?,
        end_time_unix_nano: row.get(5)?,
        duration_ns: row.get(6)?,
        name: row.get(7)?,
        kind: SpanKind::parse(&kind).unwrap_or_default(),
        status_code: StatusCode::parse(&status_code).unwrap_or_default(),
        status_message: row.get(10)?,
        service_name: row.get(11)?,
        session_id: row.get(12)?,
        gen_ai_system: row.get(13)?,
        gen_ai_request_model: row.get(14)?,
        gen_ai_response_model: row.get(15)?,
        gen_ai_input_tokens: row.get(16)?,
        gen_ai_output_tokens: row.get(17)?,
        gen_ai_cost_usd: row.get(18)?,
        gen_ai_tool_name: row.get(19)?,
        attributes_json: row.get(20)?,
        events_json: row.get(21)?,
    })
}
