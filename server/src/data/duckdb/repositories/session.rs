//! Session rollups

use duckdb::types::Value;
use duckdb::{Connection, Row, params_from_iter};

use super::span::{push_time_window, where_clause};
use super::stats::GENAI_PREDICATE;
use crate::core::constants::{DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
use crate::data::duckdb::DuckdbError;
use crate::data::types::{SessionFilter, SessionSummary};

/// ASCII unit separator between aggregated names
const LIST_SEPARATOR: &str = "chr(31)";

/// Sessions with spans matching the filter, most recently active first
pub fn list_sessions(
    conn: &Connection,
    filter: &SessionFilter,
) -> Result<Vec<SessionSummary>, DuckdbError> {
    let mut conditions: Vec<&str> = vec!["session_id IS NOT NULL"];
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(ref service) = filter.service_name {
        conditions.push("service_name = ?");
        bind_values.push(Value::Text(service.clone()));
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
        "SELECT session_id, \
                COUNT(*), \
                COUNT(DISTINCT trace_id), \
                COUNT(*) FILTER (WHERE status_code = 'error'), \
                MIN(start_time_unix_nano), \
                MAX(end_time_unix_nano), \
                array_to_string(list_sort(list_distinct(list(service_name))), {LIST_SEPARATOR}), \
                array_to_string(list_sort(list_distinct(list(gen_ai_request_model))), {LIST_SEPARATOR}), \
                COUNT(*) FILTER (WHERE {GENAI_PREDICATE}), \
                CAST(COALESCE(SUM(gen_ai_input_tokens), 0) AS BIGINT), \
                CAST(COALESCE(SUM(gen_ai_output_tokens), 0) AS BIGINT), \
                COALESCE(SUM(gen_ai_cost_usd), 0.0) \
         FROM spans{} \
         GROUP BY session_id \
         ORDER BY MAX(end_time_unix_nano) DESC, session_id \
         LIMIT {limit}",
        where_clause(&conditions)
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut query_rows = stmt.query(params_from_iter(bind_values.iter()))?;
    let mut sessions = vec![];
    while let Some(row) = query_rows.next()? {
        sessions.push(row_to_summary(row)?);
    }
    Ok(sessions)
}

fn row_to_summary(row: &Row<'_>) -> Result<SessionSummary, DuckdbError> {
    let services: Option<String> = row.get(6)?;
    let models: Option<String> = row.get(7)?;
    Ok(SessionSummary {
        session_id: row.get(0)?,
        span_count: row.get::<_, i64>(1)? as u64,
        trace_count: row.get::<_, i64>(2)? as u64,
        error_count: row.get::<_, i64>(3)? as u64,
        first_start_unix_nano: row.get(4)?,
        last_end_unix_nano: row.get(5)?,
        services: services.as_deref().map(split_list).unwrap_or_default(),
        models: models.as_deref().map(split_list).unwrap_or_default(),
        genai_request_count: row.get::<_, i64>(8)? as u64,
        total_input_tokens: row.get(9)?,
        total_output_tokens: row.get(10)?,
        total_cost_usd: row.get(11)?,
    })
}

fn split_list(joined: &str) -> Vec<String> {
    joined
        .split('\u{1f}')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
