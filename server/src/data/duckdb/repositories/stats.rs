//! GenAI usage aggregation and store statistics

use duckdb::types::Value;
use duckdb::{Connection, params_from_iter};

use super::span::{push_time_window, where_clause};
use crate::data::duckdb::DuckdbError;
use crate::data::types::{GenAiStats, StatsFilter, StorageStats};

/// A span counts as a GenAI request when it names a provider or a model
pub(crate) const GENAI_PREDICATE: &str = "(gen_ai_system IS NOT NULL \
    OR gen_ai_request_model IS NOT NULL \
    OR gen_ai_response_model IS NOT NULL)";

/// Sum request count, tokens and cost over GenAI spans matching the filter
pub fn genai_stats(conn: &Connection, filter: &StatsFilter) -> Result<GenAiStats, DuckdbError> {
    let mut conditions: Vec<&str> = vec![GENAI_PREDICATE];
    let mut bind_values: Vec<Value> = Vec::new();

    if let Some(ref session) = filter.session_id {
        conditions.push("session_id = ?");
        bind_values.push(Value::Text(session.clone()));
    }
    push_time_window(
        &mut conditions,
        &mut bind_values,
        filter.start_after,
        filter.start_before,
    );

    // SUM(BIGINT) is HUGEINT in DuckDB; cast back for the driver
    let sql = format!(
        "SELECT COUNT(*), \
                CAST(COALESCE(SUM(gen_ai_input_tokens), 0) AS BIGINT), \
                CAST(COALESCE(SUM(gen_ai_output_tokens), 0) AS BIGINT), \
                COALESCE(SUM(gen_ai_cost_usd), 0.0) \
         FROM spans{}",
        where_clause(&conditions)
    );

    let mut stmt = conn.prepare(&sql)?;
    let stats = stmt.query_row(params_from_iter(bind_values.iter()), |row| {
        Ok(GenAiStats {
            request_count: row.get::<_, i64>(0)? as u64,
            total_input_tokens: row.get(1)?,
            total_output_tokens: row.get(2)?,
            total_cost_usd: row.get(3)?,
        })
    })?;
    Ok(stats)
}

/// Row counts, extent and on-disk size of the live store
pub fn storage_stats(conn: &Connection) -> Result<StorageStats, DuckdbError> {
    let mut stats = conn.query_row(
        "SELECT COUNT(*), \
                COUNT(DISTINCT trace_id), \
                COUNT(DISTINCT session_id), \
                MIN(start_time_unix_nano), \
                MAX(start_time_unix_nano) \
         FROM spans",
        [],
        |row| {
            Ok(StorageStats {
                span_count: row.get::<_, i64>(0)? as u64,
                trace_count: row.get::<_, i64>(1)? as u64,
                session_count: row.get::<_, i64>(2)? as u64,
                database_size_bytes: 0,
                oldest_span_unix_nano: row.get(3)?,
                newest_span_unix_nano: row.get(4)?,
            })
        },
    )?;

    // In-memory stores report no used blocks
    let size: Option<i64> = conn.query_row(
        "SELECT CAST(SUM(used_blocks * block_size) AS BIGINT) \
         FROM pragma_database_size() \
         WHERE database_name = current_database()",
        [],
        |row| row.get(0),
    )?;
    stats.database_size_bytes = size.unwrap_or(0).max(0) as u64;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::duckdb::repositories::span::upsert_batch;
    use crate::data::duckdb::test_support::{open_test_db, sample_row};
    use crate::data::types::SpanRow;

    fn genai_row(span_id: &str, session: &str, start: u64, tokens: (i64, i64), cost: f64) -> SpanRow {
        let mut row = sample_row("t", span_id, start);
        row.session_id = Some(session.to_string());
        row.gen_ai_system = Some("openai".to_string());
        row.gen_ai_input_tokens = Some(tokens.0);
        row.gen_ai_output_tokens = Some(tokens.1);
        row.gen_ai_cost_usd = Some(cost);
        row
    }

    #[test]
    fn test_storage_stats_empty_store() {
        let conn = open_test_db();
        let stats = storage_stats(&conn).unwrap();
        assert_eq!(stats.span_count, 0);
        assert_eq!(stats.trace_count, 0);
        assert_eq!(stats.session_count, 0);
        assert_eq!(stats.oldest_span_unix_nano, None);
        assert_eq!(stats.newest_span_unix_nano, None);
    }

    #[test]
    fn test_storage_stats_counts_and_extent() {
        let conn = open_test_db();
        upsert_batch(
            &conn,
            &[
                genai_row("a", "s1", 300, (1, 1), 0.0),
                genai_row("b", "s2", 100, (1, 1), 0.0),
                sample_row("t2", "c", 200),
            ],
        )
        .unwrap();

        let stats = storage_stats(&conn).unwrap();
        assert_eq!(stats.span_count, 3);
        assert_eq!(stats.trace_count, 2);
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.oldest_span_unix_nano, Some(100));
        assert_eq!(stats.newest_span_unix_nano, Some(300));
    }

    #[test]
    fn test_storage_stats_reports_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let conn = Connection::open(dir.path().join("stats.duckdb")).unwrap();
        crate::data::duckdb::migrations::run_migrations(&conn).unwrap();
        upsert_batch(&conn, &[sample_row("t", "a", 1)]).unwrap();
        conn.execute_batch("CHECKPOINT").unwrap();

        let stats = storage_stats(&conn).unwrap();
        assert_eq!(stats.span_count, 1);
        assert!(stats.database_size_bytes > 0);
    }

    #[test]
    fn test_empty_store_is_zero() {
        let conn = open_test_db();
        let stats = genai_stats(&conn, &StatsFilter::default()).unwrap();
        assert_eq!(stats, GenAiStats::default());
    }

    #[test]
    fn test_session_usage_sums() {
        let conn = open_test_db();
        upsert_batch(
            &conn,
            &[
                genai_row("a", "s1", 100, (100, 50), 0.05),
                genai_row("b", "s1", 200, (80, 40), 0.04),
                genai_row("c", "s2", 300, (1, 1), 1.0),
            ],
        )
        .unwrap();

        let stats = genai_stats(
            &conn,
            &StatsFilter {
                session_id: Some("s1".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.total_input_tokens, 180);
        assert_eq!(stats.total_output_tokens, 90);
        assert!((stats.total_cost_usd - 0.09).abs() < 1e-9);
    }

    #[test]
    fn test_non_genai_spans_not_counted() {
        let conn = open_test_db();
        let mut model_only = sample_row("t", "m", 10);
        model_only.gen_ai_request_model = Some("claude".to_string());
        let mut tokens_only = sample_row("t", "x", 20);
        tokens_only.gen_ai_input_tokens = Some(999);
        upsert_batch(&conn, &[model_only, tokens_only, sample_row("t", "plain", 30)]).unwrap();

        let stats = genai_stats(&conn, &StatsFilter::default()).unwrap();
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.total_input_tokens, 0);
        assert_eq!(stats.total_cost_usd, 0.0);
    }

    #[test]
    fn test_missing_usage_treated_as_zero() {
        let conn = open_test_db();
        let mut row = genai_row("a", "s1", 100, (10, 0), 0.0);
        row.gen_ai_output_tokens = None;
        row.gen_ai_cost_usd = None;
        upsert_batch(&conn, &[row, genai_row("b", "s1", 200, (5, 5), 0.5)]).unwrap();

        let stats = genai_stats(&conn, &StatsFilter::default()).unwrap();
        assert_eq!(stats.request_count, 2);
        assert_eq!(stats.total_input_tokens, 15);
        assert_eq!(stats.total_output_tokens, 5);
        assert_eq!(stats.total_cost_usd, 0.5);
    }

    #[test]
    fn test_time_window_and_session_combine() {
        let conn = open_test_db();
        upsert_batch(
            &conn,
            &[
                genai_row("a", "s1", 100, (1, 0), 0.0),
                genai_row("b", "s1", 200, (2, 0), 0.0),
                genai_row("c", "s1", 300, (4, 0), 0.0),
                genai_row("d", "s2", 200, (8, 0), 0.0),
            ],
        )
        .unwrap();

        let stats = genai_stats(
            &conn,
            &StatsFilter {
                session_id: Some("s1".to_string()),
                start_after: Some(150),
                start_before: Some(300),
            },
        )
        .unwrap();
        assert_eq!(stats.request_count, 1);
        assert_eq!(stats.total_input_tokens, 2);

        let stats = genai_stats(
            &conn,
            &StatsFilter {
                start_after: Some(200),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(stats.request_count, 3);
        assert_eq!(stats.total_input_tokens, 14);
    }
}
