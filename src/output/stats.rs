//! Cursor statistics and export
//!
//! This module provides functionality for extracting and displaying
//! per-source crawl state from the cursor store, and for exporting cursors
//! in their persisted JSON layout.

use crate::output::traits::{OutputError, OutputResult};
use crate::source::SourceRegistry;
use crate::state::{Cursor, IdentityMode};
use crate::storage::{CursorStore, PassSummary};
use std::collections::HashMap;
use std::path::Path;

/// Crawl state of one source
#[derive(Debug, Clone)]
pub struct SourceStatistics {
    pub source_id: String,

    /// False for sources present in the store but no longer configured
    pub configured: bool,

    pub identity: Option<IdentityMode>,
    pub cursor: Cursor,
    pub last_pass: Option<PassSummary>,
}

impl SourceStatistics {
    /// Number of identities held in the never-pruned membership set
    pub fn seen_count(&self) -> usize {
        self.cursor.seen_count()
    }
}

/// Loads statistics for every configured source plus orphaned cursors
///
/// # Arguments
///
/// * `registry` - The configured sources
/// * `store` - The cursor store to query
///
/// # Returns
///
/// * `Ok(Vec<SourceStatistics>)` - One entry per source, configured ones first
/// * `Err(OutputError)` - Failed to query the store
pub fn load_statistics(
    registry: &SourceRegistry,
    store: &dyn CursorStore,
) -> OutputResult<Vec<SourceStatistics>> {
    let mut cursors: HashMap<String, Cursor> = store.list()?.into_iter().collect();
    let mut passes: HashMap<String, PassSummary> = store
        .last_passes()?
        .into_iter()
        .map(|p| (p.source_id.clone(), p))
        .collect();

    let mut stats = Vec::new();
    for source in registry.iter() {
        stats.push(SourceStatistics {
            source_id: source.id.clone(),
            configured: true,
            identity: Some(source.identity),
            cursor: cursors.remove(&source.id).unwrap_or_default(),
            last_pass: passes.remove(&source.id),
        });
    }

    let mut orphaned: Vec<_> = cursors.into_iter().collect();
    orphaned.sort_by(|a, b| a.0.cmp(&b.0));
    for (source_id, cursor) in orphaned {
        let last_pass = passes.remove(&source_id);
        stats.push(SourceStatistics {
            source_id,
            configured: false,
            identity: None,
            cursor,
            last_pass,
        });
    }

    Ok(stats)
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &[SourceStatistics]) {
    println!("=== Cursor Statistics ===\n");

    let backfilled = stats.iter().filter(|s| s.cursor.first_run_complete).count();
    let total_seen: usize = stats.iter().map(SourceStatistics::seen_count).sum();
    println!("Overview:");
    println!("  Sources: {}", stats.len());
    println!("  Backfill complete: {}", backfilled);
    println!("  Membership identities held: {}", total_seen);
    println!();

    for s in stats {
        let identity = s
            .identity
            .map_or_else(|| "not configured".to_string(), |i| i.to_string());
        println!("{} ({})", s.source_id, identity);
        println!(
            "  backfill complete: {}",
            if s.cursor.first_run_complete { "yes" } else { "no" }
        );
        println!(
            "  last seen id: {}",
            s.cursor.last_seen_id.as_deref().unwrap_or("-")
        );
        println!(
            "  last seen url: {}",
            s.cursor.last_seen_url.as_deref().unwrap_or("-")
        );
        println!("  seen identities: {}", s.seen_count());

        if let Some(pass) = &s.last_pass {
            println!(
                "  last pass: {} at {} ({} ms, {} pages, {} accepted, {} skipped) {}",
                pass.mode,
                pass.finished_at.to_rfc3339(),
                pass.elapsed_ms,
                pass.pages_visited,
                pass.items_accepted,
                pass.items_skipped,
                pass.outcome
            );
        }
        println!();
    }
}

/// Writes one `cursor_<source>.json` file per stored cursor
///
/// # Returns
///
/// The number of files written
pub fn export_cursors(store: &dyn CursorStore, dir: &Path) -> OutputResult<usize> {
    std::fs::create_dir_all(dir)?;

    let cursors = store.list()?;
    for (source_id, cursor) in &cursors {
        let json = serde_json::to_string_pretty(cursor)
            .map_err(|e| OutputError::Format(e.to_string()))?;
        std::fs::write(dir.join(format!("cursor_{}.json", source_id)), json)?;
    }

    Ok(cursors.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::storage::SqliteCursorStore;
    use tempfile::TempDir;

    fn registry() -> SourceRegistry {
        let config = parse_config(
            r#"
[output]
database-path = "./cursors.db"
records-dir = "./records"

[[source]]
id = "physics"
base-url = "https://physics.example.edu/"

[source.pagination]
kind = "offset"
template = "list?offset={offset}"

[source.listing]
row = "tr"
link = "a"
id = { kind = "query", name = "no" }
"#,
        )
        .unwrap();
        SourceRegistry::build(&config).unwrap()
    }

    #[test]
    fn test_statistics_include_orphans() {
        let store = SqliteCursorStore::open_in_memory().unwrap();
        let mut retired = Cursor::default();
        retired.seen_identity_set.insert("x".to_string());
        store.save("retired", &retired).unwrap();

        let stats = load_statistics(&registry(), &store).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].source_id, "physics");
        assert!(stats[0].configured);
        assert!(stats[0].cursor.is_empty());
        assert_eq!(stats[1].source_id, "retired");
        assert!(!stats[1].configured);
        assert_eq!(stats[1].seen_count(), 1);
    }

    #[test]
    fn test_export_cursors() {
        let store = SqliteCursorStore::open_in_memory().unwrap();
        let cursor = Cursor {
            last_seen_id: Some("102".to_string()),
            first_run_complete: true,
            ..Cursor::default()
        };
        store.save("physics", &cursor).unwrap();

        let dir = TempDir::new().unwrap();
        let written = export_cursors(&store, dir.path()).unwrap();
        assert_eq!(written, 1);

        let json = std::fs::read_to_string(dir.path().join("cursor_physics.json")).unwrap();
        let restored: Cursor = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, cursor);
    }
}
