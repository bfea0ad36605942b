//! DuckDB schema definitions
//!
//! One live `spans` table keyed by `(trace_id, span_id)`. Re-ingested spans
//! replace the stored row through `ON CONFLICT DO UPDATE`.
//!
//! No secondary indexes: DuckDB refuses `DO UPDATE SET` on indexed columns.
//! Time-window scans rely on zone maps instead.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- Infrastructure: Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at BIGINT NOT NULL,
    description VARCHAR
);

-- ═══════════════════════════════════════════════════════════════════════════════
-- Spans: one row per (trace_id, span_id), last write wins
-- ═══════════════════════════════════════════════════════════════════════════════
CREATE TABLE IF NOT EXISTS spans (
    -- ═══════════════════════════════════════════════════════════════════
    -- IDENTITY
    -- ═══════════════════════════════════════════════════════════════════
    trace_id                VARCHAR NOT NULL,   -- 32 lowercase hex
    span_id                 VARCHAR NOT NULL,   -- 16 lowercase hex
    parent_span_id          VARCHAR,            -- NULL = root
    trace_state             VARCHAR,            -- W3C trace state

    -- ═══════════════════════════════════════════════════════════════════
    -- TIMING (unix epoch nanoseconds)
    -- ═══════════════════════════════════════════════════════════════════
    start_time_unix_nano    UBIGINT NOT NULL,
    end_time_unix_nano      UBIGINT NOT NULL,
    duration_ns             UBIGINT NOT NULL,   -- end - start, clamped to 0

    -- ═══════════════════════════════════════════════════════════════════
    -- CLASSIFICATION
    -- ═══════════════════════════════════════════════════════════════════
    name                    VARCHAR NOT NULL,
    kind                    VARCHAR NOT NULL,   -- unspecified/internal/server/client/producer/consumer
    status_code             VARCHAR NOT NULL,   -- unset/ok/error
    status_message          VARCHAR,

    -- ═══════════════════════════════════════════════════════════════════
    -- CONTEXT
    -- ═══════════════════════════════════════════════════════════════════
    service_name            VARCHAR NOT NULL,
    session_id              VARCHAR,

    -- ═══════════════════════════════════════════════════════════════════
    -- GEN AI (all nullable, independent)
    -- ═══════════════════════════════════════════════════════════════════
    gen_ai_system           VARCHAR,
    gen_ai_request_model    VARCHAR,
    gen_ai_response_model   VARCHAR,
    gen_ai_input_tokens     BIGINT,
    gen_ai_output_tokens    BIGINT,
    gen_ai_cost_usd         DOUBLE,
    gen_ai_tool_name        VARCHAR,

    -- ═══════════════════════════════════════════════════════════════════
    -- OVERFLOW
    -- ═══════════════════════════════════════════════════════════════════
    attributes_json         VARCHAR NOT NULL,   -- JSON object
    events_json             VARCHAR,            -- JSON array

    PRIMARY KEY (trace_id, span_id)
);
"#;

/// Column list shared by inserts, reads and archive exports
pub const SPAN_COLUMNS: &str = "trace_id, span_id, parent_span_id, trace_state, \
    start_time_unix_nano, end_time_unix_nano, duration_ns, \
    name, kind, status_code, status_message, \
    service_name, session_id, \
    gen_ai_system, gen_ai_request_model, gen_ai_response_model, \
    gen_ai_input_tokens, gen_ai_output_tokens, gen_ai_cost_usd, gen_ai_tool_name, \
    attributes_json, events_json";
