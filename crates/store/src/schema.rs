//! Embedded SQLite schema.
//!
//! Applied with plain `CREATE TABLE IF NOT EXISTS` statements at startup
//! rather than `sqlx::migrate!`, so the crate never needs a live database at
//! compile time (the migrate! macro and the `query!` family both require
//! `DATABASE_URL` during `cargo check`; this crate uses only the runtime
//! `sqlx::query`/`query_as` builders, exactly as the grounding example does).

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL UNIQUE,
    created_at  TEXT NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS interactions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id        INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    request_id        TEXT NOT NULL UNIQUE,
    protocol          TEXT NOT NULL CHECK (protocol IN ('REST', 'gRPC')),
    method            TEXT NOT NULL,
    endpoint          TEXT NOT NULL,
    request_headers   TEXT NOT NULL,
    request_body      BLOB NOT NULL,
    response_status   INTEGER NOT NULL,
    response_headers  TEXT NOT NULL,
    response_body     BLOB NOT NULL,
    timestamp         TEXT NOT NULL,
    sequence_number   INTEGER NOT NULL,
    metadata          TEXT NOT NULL DEFAULT '{}',
    is_streaming      INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_interactions_endpoint_method
    ON interactions(endpoint, method);

CREATE UNIQUE INDEX IF NOT EXISTS idx_interactions_session_sequence
    ON interactions(session_id, endpoint, sequence_number);

CREATE TABLE IF NOT EXISTS stream_chunks (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    interaction_id INTEGER NOT NULL REFERENCES interactions(id) ON DELETE CASCADE,
    chunk_index    INTEGER NOT NULL,
    data           BLOB NOT NULL,
    timestamp      TEXT NOT NULL,
    time_delta_ms  INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_stream_chunks_interaction_index
    ON stream_chunks(interaction_id, chunk_index);
"#;
