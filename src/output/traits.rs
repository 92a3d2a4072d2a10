//! Record sink traits and error types
//!
//! This module defines the trait interface for record sinks and the
//! associated error type.

use crate::crawler::Record;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("Mirror rejected record: {0}")]
    Mirror(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Durable destination of accepted records
///
/// `persist` returning `Ok` means the record is durable; the engine advances
/// the cursor only afterwards.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn persist(&self, record: &Record) -> OutputResult<()>;

    /// Short name used in log lines
    fn name(&self) -> &str;
}
