//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `Cursor`: persisted per-source "how far we've already consumed" marker
//! - `IdentityMode`: whether candidate IDs are compared by order or by membership
//! - `CrawlPass`: ephemeral bookkeeping for one engine invocation

mod cursor;
mod pass;

// Re-export main types
pub use cursor::{Cursor, IdentityMode};
pub use pass::{CrawlPass, ModeHint, PassMode, PassOutcome, PassReport};
