//! Source registry for Notice-Sweep
//!
//! Every configured bulletin board is compiled once at startup into an
//! immutable [`Source`]: selectors are parsed, patterns compiled, header
//! profiles converted and the pagination strategy resolved. The engine only
//! ever sees these compiled records, never raw configuration strings.

mod registry;

pub use registry::SourceRegistry;

pub(crate) use registry::form_pairs;

use crate::crawler::PaginationStrategy;
use crate::state::IdentityMode;
use regex::Regex;
use reqwest::header::HeaderMap;
use scraper::Selector;
use url::Url;

/// One compiled bulletin board
#[derive(Debug, Clone)]
pub struct Source {
    pub id: String,
    pub base_url: Url,
    pub identity: IdentityMode,
    pub pagination: PaginationStrategy,
    /// Absent only for chain sources
    pub listing: Option<ListingProfile>,
    pub detail: DetailProfile,
    pub headers: HeaderMap,
    pub max_pages: Option<u32>,
    pub max_checks: Option<u32>,
}

impl Source {
    /// History pages a full backfill walks, honoring the per-source override
    pub fn max_pages_or(&self, default: u32) -> u32 {
        self.max_pages.unwrap_or(default)
    }

    /// Newest pages an incremental check inspects, honoring the per-source override
    pub fn max_checks_or(&self, default: u32) -> u32 {
        self.max_checks.unwrap_or(default)
    }
}

/// Selectors locating entries on a listing page
#[derive(Debug, Clone)]
pub struct ListingProfile {
    pub row: Selector,
    pub link: Selector,
    pub title: Option<Selector>,
    pub date: Option<Selector>,
    pub pinned: Option<Selector>,
    pub id_rule: IdRule,
    /// Base that row hrefs are resolved against
    pub link_base: Url,
}

/// Closed set of candidate-ID derivations
#[derive(Debug, Clone)]
pub enum IdRule {
    /// Named query parameter of the resolved detail URL
    QueryParam(String),
    /// First all-digit path segment of the resolved detail URL
    PathDigits,
    /// First capture group of a pattern applied to the raw href
    Pattern(Regex),
    /// Hash of the entry title
    TitleHash,
}

/// Selectors applied to a detail page
#[derive(Debug, Clone)]
pub struct DetailProfile {
    pub title: Option<Selector>,
    pub date: Option<Selector>,
    pub author: Option<Selector>,
    pub content: Option<Selector>,
    pub sub_category: Option<Selector>,
    pub next_link: Option<Selector>,
    pub no_next_markers: Vec<String>,
    /// Base for next links; the current detail page when unset
    pub link_base: Option<Url>,
    /// Set for boards whose detail pages are reached by POSTing the post number
    pub form_post: Option<DetailForm>,
}

/// Fixed POST endpoint serving detail pages
#[derive(Debug, Clone)]
pub struct DetailForm {
    pub url: Url,
    /// Field receiving the candidate ID
    pub field: String,
    /// Static fields sent along
    pub form: Vec<(String, String)>,
}

impl DetailForm {
    /// Form body requesting one post
    pub fn body_for(&self, candidate_id: &str) -> Vec<(String, String)> {
        let mut body = self.form.clone();
        body.push((self.field.clone(), candidate_id.to_string()));
        body
    }
}
