use crate::state::IdentityMode;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Notice-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "source")]
    pub sources: Vec<SourceConfig>,
}

/// Retry, timeout and pacing discipline of the fetch layer
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetcherConfig {
    /// Attempts per fetch call, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds); doubles per retry
    pub initial_backoff_ms: u64,

    /// Ceiling for the retry delay (milliseconds)
    pub max_backoff_ms: u64,

    /// Timeout of a single HTTP attempt (milliseconds)
    pub attempt_timeout_ms: u64,

    /// Wall-clock budget of a whole fetch call including retries (milliseconds)
    pub total_budget_ms: u64,

    /// Lower bound of the randomized delay after a successful fetch (milliseconds)
    pub pacing_min_ms: u64,

    /// Upper bound of the randomized delay after a successful fetch (milliseconds)
    pub pacing_max_ms: u64,

    /// User-Agent strings; one is picked at random per request
    pub user_agents: Vec<String>,

    /// Accept self-signed or expired certificates (some boards need this)
    pub accept_invalid_certs: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_backoff_ms: 2_000,
            max_backoff_ms: 100_000,
            attempt_timeout_ms: 30_000,
            total_budget_ms: 200_000,
            pacing_min_ms: 100,
            pacing_max_ms: 500,
            user_agents: vec![
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            ],
            accept_invalid_certs: false,
        }
    }
}

/// Traversal limits of the crawl engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EngineConfig {
    /// History pages walked by a full backfill
    pub max_pages: u32,

    /// Newest pages inspected by an incremental check
    pub max_checks: u32,

    /// Maximum links followed by one chain walk
    pub max_chain_length: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            max_checks: 1,
            max_chain_length: 50,
        }
    }
}

/// Polling cadence and worker pool size
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SchedulerConfig {
    /// Maximum number of sources crawled concurrently
    pub pool_size: u32,

    /// Seconds between two polling ticks
    pub interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            interval_secs: 600,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite cursor database
    pub database_path: String,

    /// Directory receiving the per-source JSONL record logs
    pub records_dir: String,

    /// Size after which a record log is rotated (bytes)
    #[serde(default = "default_max_log_bytes")]
    pub max_log_bytes: u64,

    /// Optional best-effort search index mirror
    #[serde(default)]
    pub index: Option<IndexConfig>,
}

fn default_max_log_bytes() -> u64 {
    50 * 1024 * 1024
}

/// Remote search index receiving a copy of every record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct IndexConfig {
    /// Document endpoint records are POSTed to
    pub endpoint: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// One bulletin board
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Unique identifier, also used as the cursor key and log file suffix
    pub id: String,

    /// Base URL every relative template and href is resolved against
    pub base_url: String,

    /// First detail page of a chain source, or the fixed endpoint of a
    /// single-request source
    #[serde(default)]
    pub start_url: Option<String>,

    #[serde(default)]
    pub identity: IdentityMode,

    pub pagination: PaginationConfig,

    /// Listing-page selectors; required for every kind except `chain`
    #[serde(default)]
    pub listing: Option<ListingConfig>,

    #[serde(default)]
    pub detail: DetailConfig,

    /// Extra request headers sent with every request to this source
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Overrides `engine.max-pages` for this source
    #[serde(default)]
    pub max_pages: Option<u32>,

    /// Overrides `engine.max-checks` for this source
    #[serde(default)]
    pub max_checks: Option<u32>,
}

/// Pagination kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationKind {
    /// `offset = k * page-size`, 0-indexed
    Offset,
    /// `page = k`, 1-indexed
    PageNumber,
    /// One listing endpoint regardless of page index
    SingleRequest,
    /// No listing; each detail page links to the next newer post
    Chain,
}

/// HTTP method used for listing requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
}

/// How a logical page index becomes a request
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PaginationConfig {
    pub kind: PaginationKind,

    /// URL template with an `{offset}` or `{page}` placeholder (GET), or the
    /// plain listing URL (POST, single-request)
    #[serde(default)]
    pub template: Option<String>,

    /// Page-number sources whose first page lives at a different URL
    #[serde(default)]
    pub first_page_template: Option<String>,

    /// Entries per page for offset-based sources
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    #[serde(default)]
    pub method: HttpMethod,

    /// Static form fields sent with POST listings
    #[serde(default)]
    pub form: BTreeMap<String, String>,

    /// Form field carrying the page number of POST listings
    #[serde(default)]
    pub page_field: Option<String>,
}

fn default_page_size() -> u32 {
    10
}

/// Selectors locating entries on a listing page
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ListingConfig {
    /// One element per entry
    pub row: String,

    /// Anchor inside a row leading to the detail page
    pub link: String,

    /// Title text inside a row; defaults to the anchor text
    #[serde(default)]
    pub title: Option<String>,

    /// Date text inside a row, used to order entries
    #[serde(default)]
    pub date: Option<String>,

    /// Matches rows the board pins to the top of every page
    #[serde(default)]
    pub pinned: Option<String>,

    /// Rule deriving the candidate ID of an entry
    pub id: IdRuleConfig,

    /// Base for resolving row hrefs when it differs from `base-url`
    #[serde(default)]
    pub link_base: Option<String>,
}

/// Where a candidate ID lives
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum IdRuleConfig {
    /// Query parameter of the resolved detail URL
    Query { name: String },
    /// First all-digit path segment of the resolved detail URL
    PathDigits,
    /// First capture group of a pattern applied to the raw href
    Regex { pattern: String },
    /// SHA-256 of the entry title; requires membership identity
    TitleHash,
}

/// Selectors applied to a detail page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DetailConfig {
    pub title: Option<String>,
    pub date: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub sub_category: Option<String>,

    /// Anchor pointing at the next newer post (chain sources)
    pub next_link: Option<String>,

    /// Anchor texts meaning "there is no next post"
    pub no_next_markers: Vec<String>,

    /// Base for resolving next links; defaults to the page the link is on
    pub link_base: Option<String>,

    /// Fixed detail endpoint for boards that POST the post number
    pub url: Option<String>,

    /// Form field receiving the candidate ID when POSTing for a detail page
    pub form_field: Option<String>,

    /// Static form fields sent with detail POSTs
    pub form: BTreeMap<String, String>,
}
