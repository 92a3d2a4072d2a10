//! Configuration module for Notice-Sweep
//!
//! This module handles loading, parsing, and validating the TOML file that
//! describes the fetch discipline, engine limits, scheduler cadence, output
//! locations and every polled source.
//!
//! # Example
//!
//! ```no_run
//! use notice_sweep::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sweep.toml")).unwrap();
//! println!("Polling every {}s", config.scheduler.interval_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, DetailConfig, EngineConfig, FetcherConfig, HttpMethod, IdRuleConfig, IndexConfig,
    ListingConfig, OutputConfig, PaginationConfig, PaginationKind, SchedulerConfig, SourceConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
