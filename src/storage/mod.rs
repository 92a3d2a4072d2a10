//! Storage module for persisting crawl state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Per-source cursor load, atomic save and operator deletion
//! - Pass history for operator statistics

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteCursorStore;
pub use traits::{CursorStore, PassSummary, StorageError, StorageResult};

use std::path::Path;

/// Opens the cursor database configured in `[output]`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteCursorStore)` - Successfully opened store
/// * `Err(StorageError)` - Failed to open the database
pub fn open_cursor_store(path: &Path) -> StorageResult<SqliteCursorStore> {
    SqliteCursorStore::open(path)
}
