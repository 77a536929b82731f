//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Repograph database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Graph nodes: repositories (bipartite = 0) and people (bipartite = 1)
CREATE TABLE IF NOT EXISTS nodes (
    key TEXT PRIMARY KEY,
    bipartite INTEGER NOT NULL,
    language TEXT,
    weight INTEGER
);

CREATE INDEX IF NOT EXISTS idx_nodes_bipartite ON nodes(bipartite);

-- Person -> repository edges
CREATE TABLE IF NOT EXISTS edges (
    person TEXT NOT NULL REFERENCES nodes(key),
    repository TEXT NOT NULL REFERENCES nodes(key),
    relation TEXT NOT NULL,
    PRIMARY KEY (person, repository)
);

CREATE INDEX IF NOT EXISTS idx_edges_repository ON edges(repository);

-- Resumable cursors, one per (source, query, since)
CREATE TABLE IF NOT EXISTS sessions (
    session_key TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    query TEXT,
    since TEXT,
    cursor_offset INTEGER NOT NULL DEFAULT 0,
    completed INTEGER NOT NULL DEFAULT 0,
    remaining INTEGER,
    updated_at TEXT NOT NULL
);

-- One row per finished pass
CREATE TABLE IF NOT EXISTS passes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_key TEXT NOT NULL,
    status TEXT NOT NULL,
    analyzed INTEGER NOT NULL,
    added INTEGER NOT NULL,
    cursor_offset INTEGER NOT NULL,
    error TEXT,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_passes_session ON passes(session_key);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
