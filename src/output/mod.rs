//! Output module for persisting records and reporting crawl state
//!
//! This module handles:
//! - The append-only JSONL record log (the primary, durable sink)
//! - An optional best-effort HTTP index mirror
//! - Fan-out publishing where only the primary sink can fail a record
//! - Cursor statistics and cursor export for operators

mod jsonl;
mod mirror;
pub mod stats;
mod traits;

pub use jsonl::JsonlLog;
pub use mirror::HttpIndexMirror;
pub use stats::{export_cursors, load_statistics, print_statistics, SourceStatistics};
pub use traits::{OutputError, OutputResult, RecordSink};

use crate::config::OutputConfig;
use crate::crawler::Record;
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;

/// Primary sink plus best-effort mirrors
///
/// A record is accepted once the primary sink has it. Mirror failures are
/// logged and swallowed.
pub struct Publisher {
    primary: Arc<dyn RecordSink>,
    mirrors: Vec<Arc<dyn RecordSink>>,
}

impl Publisher {
    pub fn new(primary: Arc<dyn RecordSink>) -> Self {
        Self {
            primary,
            mirrors: Vec::new(),
        }
    }

    pub fn with_mirror(mut self, mirror: Arc<dyn RecordSink>) -> Self {
        self.mirrors.push(mirror);
        self
    }

    /// Builds the publisher described by `[output]`
    ///
    /// # Arguments
    ///
    /// * `config` - The output configuration
    /// * `client` - HTTP client reused for the index mirror
    pub fn from_config(config: &OutputConfig, client: Client) -> OutputResult<Self> {
        let log = JsonlLog::new(&config.records_dir, config.max_log_bytes)?;
        let mut publisher = Self::new(Arc::new(log));

        if let Some(index) = &config.index {
            publisher = publisher.with_mirror(Arc::new(HttpIndexMirror::new(client, index)?));
        }

        Ok(publisher)
    }
}

#[async_trait]
impl RecordSink for Publisher {
    async fn persist(&self, record: &Record) -> OutputResult<()> {
        self.primary.persist(record).await?;

        for mirror in &self.mirrors {
            if let Err(e) = mirror.persist(record).await {
                tracing::warn!(
                    source = %record.source,
                    "{} failed for {}: {}",
                    mirror.name(),
                    record.url,
                    e
                );
            }
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "publisher"
    }
}
