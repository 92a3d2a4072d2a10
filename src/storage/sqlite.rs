//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CursorStore trait.

use crate::state::{Cursor, PassOutcome, PassReport};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CursorStore, PassSummary, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite cursor store
pub struct SqliteCursorStore {
    conn: Mutex<Connection>,
}

struct CursorRow {
    source_id: String,
    last_seen_id: Option<String>,
    last_seen_url: Option<String>,
    first_run_complete: bool,
    seen_identity_set: String,
}

impl SqliteCursorStore {
    /// Opens or creates the cursor database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCursorStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (tests, dry runs)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl CursorStore for SqliteCursorStore {
    fn load(&self, source_id: &str) -> StorageResult<Cursor> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT source_id, last_seen_id, last_seen_url, first_run_complete, seen_identity_set
                 FROM cursors WHERE source_id = ?1",
                params![source_id],
                read_cursor_row,
            )
            .optional();

        match row {
            Ok(Some(row)) => Ok(decode_cursor(row)),
            Ok(None) => Ok(Cursor::default()),
            // Type mismatches mean the row was written by something else
            Err(rusqlite::Error::InvalidColumnType(..))
            | Err(rusqlite::Error::FromSqlConversionFailure(..)) => {
                tracing::warn!(
                    source = %source_id,
                    "Cursor row is unreadable; starting from an empty cursor"
                );
                Ok(Cursor::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, source_id: &str, cursor: &Cursor) -> StorageResult<()> {
        let seen = serde_json::to_string(&cursor.seen_identity_set)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let now = Utc::now().to_rfc3339();

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cursors
             (source_id, last_seen_id, last_seen_url, first_run_complete, seen_identity_set, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(source_id) DO UPDATE SET
                last_seen_id = excluded.last_seen_id,
                last_seen_url = excluded.last_seen_url,
                first_run_complete = excluded.first_run_complete,
                seen_identity_set = excluded.seen_identity_set,
                updated_at = excluded.updated_at",
            params![
                source_id,
                cursor.last_seen_id,
                cursor.last_seen_url,
                cursor.first_run_complete,
                seen,
                now,
            ],
        )?;

        Ok(())
    }

    fn delete(&self, source_id: &str) -> StorageResult<bool> {
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM cursors WHERE source_id = ?1", params![source_id])?;
        Ok(removed > 0)
    }

    fn list(&self) -> StorageResult<Vec<(String, Cursor)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, last_seen_id, last_seen_url, first_run_complete, seen_identity_set
             FROM cursors ORDER BY source_id",
        )?;

        let rows = stmt.query_map([], read_cursor_row)?;

        let mut cursors = Vec::new();
        for row in rows {
            let row = row?;
            let source_id = row.source_id.clone();
            cursors.push((source_id, decode_cursor(row)));
        }

        Ok(cursors)
    }

    fn record_pass(&self, report: &PassReport) -> StorageResult<()> {
        let outcome = match &report.outcome {
            PassOutcome::Completed => "completed".to_string(),
            PassOutcome::Aborted(reason) => format!("aborted: {}", reason),
        };
        let elapsed_ms = i64::try_from(report.elapsed.as_millis()).unwrap_or(i64::MAX);

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO passes
             (source_id, mode, finished_at, elapsed_ms, pages_visited, items_accepted, items_skipped, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                report.source_id,
                report.mode.to_string(),
                Utc::now().to_rfc3339(),
                elapsed_ms,
                report.pages_visited,
                report.items_accepted,
                report.items_skipped,
                outcome,
            ],
        )?;

        Ok(())
    }

    fn last_passes(&self) -> StorageResult<Vec<PassSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source_id, mode, finished_at, elapsed_ms, pages_visited, items_accepted, items_skipped, outcome
             FROM passes
             WHERE id IN (SELECT MAX(id) FROM passes GROUP BY source_id)
             ORDER BY source_id",
        )?;

        let rows = stmt.query_map([], |row| {
            let finished_at: String = row.get(2)?;
            let elapsed_ms: i64 = row.get(3)?;
            Ok(PassSummary {
                source_id: row.get(0)?,
                mode: row.get(1)?,
                finished_at: finished_at.parse::<DateTime<Utc>>().unwrap_or_default(),
                elapsed_ms: u64::try_from(elapsed_ms).unwrap_or(0),
                pages_visited: row.get(4)?,
                items_accepted: row.get(5)?,
                items_skipped: row.get(6)?,
                outcome: row.get(7)?,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }
}

fn read_cursor_row(row: &Row<'_>) -> rusqlite::Result<CursorRow> {
    Ok(CursorRow {
        source_id: row.get(0)?,
        last_seen_id: row.get(1)?,
        last_seen_url: row.get(2)?,
        first_run_complete: row.get(3)?,
        seen_identity_set: row.get(4)?,
    })
}

/// Unparseable membership state cannot be trusted; start over
fn decode_cursor(row: CursorRow) -> Cursor {
    match serde_json::from_str::<BTreeSet<String>>(&row.seen_identity_set) {
        Ok(seen_identity_set) => Cursor {
            last_seen_id: row.last_seen_id,
            last_seen_url: row.last_seen_url,
            first_run_complete: row.first_run_complete,
            seen_identity_set,
        },
        Err(e) => {
            tracing::warn!(
                source = %row.source_id,
                "Cursor seen-set is corrupt ({}); starting from an empty cursor, duplicates may follow",
                e
            );
            Cursor::default()
        }
    }
}
