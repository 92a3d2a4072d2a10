//! Crawl pass bookkeeping
//!
//! A `CrawlPass` lives for exactly one engine invocation on one source and
//! is never persisted. Its final counters are reported as a `PassReport`.

use crate::state::Cursor;
use std::fmt;
use std::time::{Duration, Instant};

/// Traversal mode of a single pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassMode {
    /// First-ever crawl: walk all configured history pages oldest to newest
    FullBackfill,

    /// Steady-state poll of only the newest page(s)
    IncrementalCheck,
}

impl PassMode {
    /// Picks the mode a cursor calls for
    pub fn for_cursor(cursor: &Cursor) -> Self {
        if cursor.first_run_complete {
            Self::IncrementalCheck
        } else {
            Self::FullBackfill
        }
    }
}

impl fmt::Display for PassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullBackfill => write!(f, "full-backfill"),
            Self::IncrementalCheck => write!(f, "incremental-check"),
        }
    }
}

/// Caller preference for the pass mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeHint {
    /// Let the cursor decide
    #[default]
    Auto,

    /// Force a mode regardless of the cursor
    Force(PassMode),
}

impl ModeHint {
    /// Resolves the hint against a loaded cursor
    pub fn resolve(self, cursor: &Cursor) -> PassMode {
        match self {
            Self::Auto => PassMode::for_cursor(cursor),
            Self::Force(mode) => mode,
        }
    }
}

/// How a pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every page the mode calls for was processed
    Completed,

    /// The pass stopped early; the reason is logged and kept here
    Aborted(String),
}

/// Ephemeral execution context of one engine invocation
#[derive(Debug)]
pub struct CrawlPass {
    pub source_id: String,
    pub mode: PassMode,
    pub pages_visited: u32,
    pub items_accepted: u32,
    pub items_skipped: u32,
    started: Instant,
}

impl CrawlPass {
    /// Starts a new pass for a source
    pub fn new(source_id: &str, mode: PassMode) -> Self {
        Self {
            source_id: source_id.to_string(),
            mode,
            pages_visited: 0,
            items_accepted: 0,
            items_skipped: 0,
            started: Instant::now(),
        }
    }

    /// Ends the pass successfully
    pub fn complete(self) -> PassReport {
        self.finish(PassOutcome::Completed)
    }

    /// Ends the pass early
    pub fn abort(self, reason: impl Into<String>) -> PassReport {
        self.finish(PassOutcome::Aborted(reason.into()))
    }

    fn finish(self, outcome: PassOutcome) -> PassReport {
        PassReport {
            source_id: self.source_id,
            mode: self.mode,
            pages_visited: self.pages_visited,
            items_accepted: self.items_accepted,
            items_skipped: self.items_skipped,
            elapsed: self.started.elapsed(),
            outcome,
        }
    }
}

/// Result of one finished pass
#[derive(Debug, Clone)]
pub struct PassReport {
    pub source_id: String,
    pub mode: PassMode,
    pub pages_visited: u32,
    pub items_accepted: u32,
    pub items_skipped: u32,
    pub elapsed: Duration,
    pub outcome: PassOutcome,
}

impl PassReport {
    /// Returns true if the pass ran to completion
    pub fn is_complete(&self) -> bool {
        self.outcome == PassOutcome::Completed
    }
}
