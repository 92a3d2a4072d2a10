//! Notice-Sweep main entry point
//!
//! This is the command-line interface for the Notice-Sweep board crawler.

use anyhow::{bail, Context};
use clap::Parser;
use notice_sweep::config::{load_config_with_hash, Config};
use notice_sweep::crawler::{build_scheduler, PaginationStrategy};
use notice_sweep::output::{export_cursors, load_statistics, print_statistics};
use notice_sweep::source::SourceRegistry;
use notice_sweep::storage::{open_cursor_store, CursorStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Notice-Sweep: an incremental bulletin-board crawler
///
/// Notice-Sweep polls the configured boards on a fixed interval and emits
/// every new announcement exactly once to a per-source JSONL log. Progress
/// is kept in a cursor database, so restarts resume where they left off.
#[derive(Parser, Debug)]
#[command(name = "notice-sweep")]
#[command(version)]
#[command(about = "An incremental bulletin-board crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,

    /// Only crawl this source (implies --once)
    #[arg(long, value_name = "ID")]
    source: Option<String>,

    /// Validate config and show the resolved sources without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_cursors", "reset"])]
    dry_run: bool,

    /// Show per-source cursor statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_cursors", "reset"])]
    stats: bool,

    /// Write one JSON file per source cursor into DIR and exit
    #[arg(long, value_name = "DIR", conflicts_with_all = ["dry_run", "stats", "reset"])]
    export_cursors: Option<PathBuf>,

    /// Delete one source's cursor so its next pass is a full backfill
    #[arg(long, value_name = "ID", conflicts_with_all = ["dry_run", "stats", "export_cursors"])]
    reset: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(dir) = &cli.export_cursors {
        handle_export_cursors(&config, dir)
    } else if let Some(source_id) = &cli.reset {
        handle_reset(&config, source_id)
    } else {
        handle_crawl(&config, cli.once, cli.source.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("notice_sweep=info,warn"),
            1 => EnvFilter::new("notice_sweep=debug,info"),
            2 => EnvFilter::new("notice_sweep=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: compiles every source and prints it
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let registry = SourceRegistry::build(config)?;

    println!("=== Notice-Sweep Dry Run ===\n");

    println!("Fetcher:");
    println!("  Max attempts: {}", config.fetcher.max_attempts);
    println!(
        "  Backoff: {}ms doubling up to {}ms",
        config.fetcher.initial_backoff_ms, config.fetcher.max_backoff_ms
    );
    println!("  Total budget: {}ms", config.fetcher.total_budget_ms);

    println!("\nEngine:");
    println!("  Backfill pages: {}", config.engine.max_pages);
    println!("  Incremental checks: {}", config.engine.max_checks);
    println!("  Chain length: {}", config.engine.max_chain_length);

    println!("\nScheduler:");
    println!("  Pool size: {}", config.scheduler.pool_size);
    println!("  Interval: {}s", config.scheduler.interval_secs);

    println!("\nOutput:");
    println!("  Cursor database: {}", config.output.database_path);
    println!("  Record logs: {}", config.output.records_dir);
    if let Some(index) = &config.output.index {
        println!("  Index mirror: {}", index.endpoint);
    }

    println!("\nSources ({}):", registry.len());
    for source in registry.iter() {
        println!(
            "  - {} [{}, {} identity] {}",
            source.id,
            describe_pagination(&source.pagination),
            source.identity,
            source.base_url
        );
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

fn describe_pagination(pagination: &PaginationStrategy) -> String {
    match pagination {
        PaginationStrategy::Offset { page_size, .. } => format!("offset x{}", page_size),
        PaginationStrategy::PageNumber { .. } => "page-number".to_string(),
        PaginationStrategy::SingleRequest { .. } => "single-request".to_string(),
        PaginationStrategy::Chain { start_url } => format!("chain from {}", start_url),
    }
}

/// Handles the --stats mode: shows cursor statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    let registry = SourceRegistry::build(config)?;
    let store = open_cursor_store(Path::new(&config.output.database_path))?;

    println!("Database: {}\n", config.output.database_path);

    let stats = load_statistics(&registry, &store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-cursors mode
fn handle_export_cursors(config: &Config, dir: &Path) -> anyhow::Result<()> {
    let store = open_cursor_store(Path::new(&config.output.database_path))?;

    let written = export_cursors(&store, dir)?;
    println!("✓ Exported {} cursor(s) to: {}", written, dir.display());

    Ok(())
}

/// Handles the --reset mode: the only way a cursor is ever deleted
fn handle_reset(config: &Config, source_id: &str) -> anyhow::Result<()> {
    let store = open_cursor_store(Path::new(&config.output.database_path))?;

    if store.delete(source_id)? {
        tracing::info!(source = %source_id, "Cursor deleted");
        println!("✓ Cursor of '{}' deleted; next pass is a full backfill", source_id);
    } else {
        println!("No cursor stored for '{}'", source_id);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, once: bool, only: Option<&str>) -> anyhow::Result<()> {
    let scheduler = build_scheduler(config)?;

    tracing::info!(
        "Crawling {} source(s) with {} worker(s)",
        config.sources.len(),
        config.scheduler.pool_size
    );

    if once || only.is_some() {
        let summary = scheduler.run_tick(only).await?;
        if summary.failed > 0 && summary.completed == 0 && summary.aborted == 0 {
            bail!("every pass failed");
        }
        return Ok(());
    }

    let interval = Duration::from_secs(config.scheduler.interval_secs);
    scheduler.run_forever(interval).await?;
    tracing::info!("Crawler stopped");

    Ok(())
}
