//! Crawler module for incremental board crawling
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with retry, backoff and a wall-clock budget
//! - Pagination strategies mapping page indexes to requests
//! - Listing-page parsing and intra-page ordering
//! - Detail-page extraction into records
//! - The crawl engine and the scheduler driving it

mod engine;
mod extract;
mod fetcher;
mod listing;
mod pagination;
mod scheduler;

pub use engine::{CrawlEngine, EngineLimits};
pub use extract::{Attachment, Extract, ExtractError, Record, SelectorExtractor};
pub use fetcher::{
    build_http_client, FetchError, FetchOutcome, FetchRequest, FetchedPage, Fetcher,
    RequestMethod, RetryPolicy,
};
pub use listing::{
    date_to_ordinal, parse_board_date, parse_listing, processing_order, DetailRef, ListingEntry,
};
pub use pagination::{PageTarget, PaginationStrategy};
pub use scheduler::{Scheduler, TickSummary};

use crate::config::Config;
use crate::output::Publisher;
use crate::source::SourceRegistry;
use crate::storage::open_cursor_store;
use crate::SweepError;
use std::path::Path;
use std::sync::Arc;

/// Wires a scheduler from a validated configuration
///
/// This is the main entry point for running the crawler. It will:
/// 1. Compile the source registry
/// 2. Open the cursor store
/// 3. Build the HTTP client and fetcher
/// 4. Set up the record log and optional index mirror
/// 5. Assemble the engine and the worker pool
///
/// # Arguments
///
/// * `config` - The crawler configuration
///
/// # Returns
///
/// * `Ok(Scheduler)` - Ready to tick
/// * `Err(SweepError)` - A component could not be set up
pub fn build_scheduler(config: &Config) -> Result<Scheduler, SweepError> {
    let registry = Arc::new(SourceRegistry::build(config)?);
    let cursors = Arc::new(open_cursor_store(Path::new(&config.output.database_path))?);

    let client = build_http_client(&config.fetcher)?;
    let fetcher = Fetcher::from_config(client.clone(), &config.fetcher);
    let publisher = Publisher::from_config(&config.output, client)?;

    let engine = CrawlEngine::new(
        fetcher,
        Arc::new(SelectorExtractor),
        Arc::new(publisher),
        cursors,
        EngineLimits::from(&config.engine),
    );

    Ok(Scheduler::new(
        Arc::new(engine),
        registry,
        config.scheduler.pool_size as usize,
    ))
}
