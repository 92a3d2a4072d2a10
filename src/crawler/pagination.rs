//! Pagination strategies
//!
//! Maps a logical page index to a fetchable request. Page indices are
//! scheme-specific: offset sources count from 0, page-number sources from 1.
//! Lower indices always hold newer content.

use crate::config::{HttpMethod, PaginationConfig, PaginationKind};
use crate::crawler::fetcher::FetchRequest;
use crate::source::form_pairs;
use crate::url::resolve_template;
use crate::{ConfigError, UrlError};
use url::Url;

const OFFSET_PLACEHOLDER: &str = "{offset}";
const PAGE_PLACEHOLDER: &str = "{page}";

/// Where the page value goes
#[derive(Debug, Clone)]
pub enum PageTarget {
    /// Substituted into a URL template and fetched with GET
    Template { base: Url, template: String },

    /// Sent as a form field of a POST to a fixed URL
    Form {
        url: Url,
        page_field: String,
        form: Vec<(String, String)>,
    },
}

impl PageTarget {
    fn request(&self, placeholder: &'static str, value: u64) -> Result<FetchRequest, UrlError> {
        match self {
            Self::Template { base, template } => Ok(FetchRequest::get(resolve_template(
                base,
                template,
                placeholder,
                value,
            )?)),
            Self::Form {
                url,
                page_field,
                form,
            } => {
                let mut body = form.clone();
                body.push((page_field.clone(), value.to_string()));
                Ok(FetchRequest::post_form(url.clone(), body))
            }
        }
    }
}

/// Per-source mapping from page index to request
#[derive(Debug, Clone)]
pub enum PaginationStrategy {
    /// Page `k` maps to `offset = k * page_size`, 0-indexed
    Offset { page_size: u32, target: PageTarget },

    /// Page `k` maps to `page = k`, 1-indexed
    PageNumber {
        target: PageTarget,
        /// Some boards serve page 1 from a different URL
        first_page: Option<Url>,
    },

    /// One listing endpoint regardless of page index
    SingleRequest { request: FetchRequest },

    /// No listing; the engine walks next links from detail pages
    Chain { start_url: Url },
}

impl PaginationStrategy {
    /// Resolves a `[source.pagination]` table against the source's base URL
    pub fn from_config(
        source_id: &str,
        config: &PaginationConfig,
        base: &Url,
        start_url: Option<&str>,
    ) -> Result<Self, ConfigError> {
        let join = |value: &str| {
            base.join(value).map_err(|e| {
                ConfigError::InvalidUrl(format!("source '{}': {}: {}", source_id, value, e))
            })
        };
        let missing = |what: &str| {
            ConfigError::Validation(format!("Source '{}' pagination needs {}", source_id, what))
        };

        let target = || -> Result<PageTarget, ConfigError> {
            let template = config.template.as_deref().ok_or_else(|| missing("a template"))?;
            match config.method {
                HttpMethod::Get => Ok(PageTarget::Template {
                    base: base.clone(),
                    template: template.to_string(),
                }),
                HttpMethod::Post => Ok(PageTarget::Form {
                    url: join(template)?,
                    page_field: config
                        .page_field
                        .clone()
                        .ok_or_else(|| missing("a page-field"))?,
                    form: form_pairs(&config.form),
                }),
            }
        };

        match config.kind {
            PaginationKind::Offset => Ok(Self::Offset {
                page_size: config.page_size.max(1),
                target: target()?,
            }),
            PaginationKind::PageNumber => Ok(Self::PageNumber {
                target: target()?,
                first_page: config.first_page_template.as_deref().map(join).transpose()?,
            }),
            PaginationKind::SingleRequest => {
                let location = config
                    .template
                    .as_deref()
                    .or(start_url)
                    .ok_or_else(|| missing("a template or start-url"))?;
                let url = join(location)?;
                let request = match config.method {
                    HttpMethod::Get => FetchRequest::get(url),
                    HttpMethod::Post => FetchRequest::post_form(url, form_pairs(&config.form)),
                };
                Ok(Self::SingleRequest { request })
            }
            PaginationKind::Chain => Ok(Self::Chain {
                start_url: join(start_url.ok_or_else(|| missing("a start-url"))?)?,
            }),
        }
    }

    /// Index of the newest listing page
    pub fn newest_page(&self) -> u32 {
        match self {
            Self::PageNumber { .. } => 1,
            Self::Offset { .. } | Self::SingleRequest { .. } | Self::Chain { .. } => 0,
        }
    }

    pub fn is_newest(&self, page: u32) -> bool {
        page == self.newest_page()
    }

    pub fn is_chain(&self) -> bool {
        matches!(self, Self::Chain { .. })
    }

    /// Where a chain walk starts when the cursor has no last-seen URL
    pub fn chain_start(&self) -> Option<&Url> {
        match self {
            Self::Chain { start_url } => Some(start_url),
            _ => None,
        }
    }

    /// The newest `count` pages, oldest first
    ///
    /// A full backfill walks `reverse_pages(max_pages)`, an incremental check
    /// `reverse_pages(max_checks)`. Single-endpoint sources always yield one
    /// page and chain sources none.
    pub fn reverse_pages(&self, count: u32) -> Vec<u32> {
        match self {
            Self::Offset { .. } => (0..count).rev().collect(),
            Self::PageNumber { .. } => (1..=count).rev().collect(),
            Self::SingleRequest { .. } => vec![0],
            Self::Chain { .. } => Vec::new(),
        }
    }

    /// Request fetching listing page `page`
    pub fn request_for(&self, page: u32) -> Result<FetchRequest, UrlError> {
        match self {
            Self::Offset { page_size, target } => {
                target.request(OFFSET_PLACEHOLDER, u64::from(page) * u64::from(*page_size))
            }
            Self::PageNumber { target, first_page } => match first_page {
                Some(url) if page <= 1 => Ok(FetchRequest::get(url.clone())),
                _ => target.request(PAGE_PLACEHOLDER, u64::from(page.max(1))),
            },
            Self::SingleRequest { request } => Ok(request.clone()),
            Self::Chain { .. } => Err(UrlError::Unusable(
                "chain sources have no listing pages".to_string(),
            )),
        }
    }
}
