//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Notice-Sweep
//! cursor database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One cursor per source; replaced atomically on every save
CREATE TABLE IF NOT EXISTS cursors (
    source_id TEXT PRIMARY KEY,
    last_seen_id TEXT,
    last_seen_url TEXT,
    first_run_complete INTEGER NOT NULL DEFAULT 0,
    seen_identity_set TEXT NOT NULL DEFAULT '[]',
    updated_at TEXT NOT NULL
);

-- History of finished passes, for operators
CREATE TABLE IF NOT EXISTS passes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id TEXT NOT NULL,
    mode TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    elapsed_ms INTEGER NOT NULL,
    pages_visited INTEGER NOT NULL,
    items_accepted INTEGER NOT NULL,
    items_skipped INTEGER NOT NULL,
    outcome TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_passes_source ON passes(source_id, id);
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
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Current schema version, stored in SQLite's `user_version`
pub const SCHEMA_VERSION: u32 = 1;
