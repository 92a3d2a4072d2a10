//! Storage traits and error types
//!
//! This module defines the trait interface for cursor store backends and
//! associated error types.

use crate::state::{Cursor, PassReport};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One row of pass history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassSummary {
    pub source_id: String,
    pub mode: String,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub pages_visited: u32,
    pub items_accepted: u32,
    pub items_skipped: u32,
    /// `completed` or `aborted: <reason>`
    pub outcome: String,
}

/// Durable per-source crawl state
///
/// Implementations must be usable from several passes at once; the
/// scheduler guarantees they never touch the same source concurrently.
pub trait CursorStore: Send + Sync {
    /// Loads a source's cursor
    ///
    /// A missing cursor is not an error: the default (empty) cursor is
    /// returned. Unreadable state is logged and also yields the default.
    fn load(&self, source_id: &str) -> StorageResult<Cursor>;

    /// Atomically replaces a source's cursor
    fn save(&self, source_id: &str, cursor: &Cursor) -> StorageResult<()>;

    /// Deletes a source's cursor
    ///
    /// # Returns
    ///
    /// `true` if a cursor existed
    fn delete(&self, source_id: &str) -> StorageResult<bool>;

    /// Every stored cursor, ordered by source id
    fn list(&self) -> StorageResult<Vec<(String, Cursor)>>;

    /// Appends a finished pass to the history
    fn record_pass(&self, report: &PassReport) -> StorageResult<()>;

    /// Most recent pass of each source, ordered by source id
    fn last_passes(&self) -> StorageResult<Vec<PassSummary>>;
}
