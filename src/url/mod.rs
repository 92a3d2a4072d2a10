//! URL handling module for Notice-Sweep
//!
//! This module resolves listing and detail hrefs against a source's base URL
//! and derives candidate identifiers from the resulting URLs.

mod identity;
mod resolve;

// Re-export main functions
pub use identity::{first_numeric_segment, query_param, regex_capture, title_hash};
pub use resolve::{is_navigable_href, resolve_href, resolve_template};
