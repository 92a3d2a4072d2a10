//! Crawl engine
//!
//! Runs one pass over one source. The pass mode is picked from the cursor:
//! - Full backfill walks the configured history pages oldest to newest and
//!   saves the cursor once, at the very end
//! - Incremental check polls the newest page(s) and saves the cursor after
//!   every accepted item
//! - Chain sources walk "next post" links from the last known detail page
//!
//! Within a pass everything is sequential. Whatever goes wrong, the pass
//! ends with a [`PassReport`]; only a failure to load the cursor is an error.

use crate::config::EngineConfig;
use crate::crawler::extract::Extract;
use crate::crawler::fetcher::{FetchError, FetchOutcome, FetchRequest, Fetcher};
use crate::crawler::listing::{
    element_text, parse_board_date, parse_listing, processing_order, ListingEntry,
};
use crate::output::RecordSink;
use crate::source::Source;
use crate::state::{CrawlPass, Cursor, ModeHint, PassMode, PassReport};
use crate::storage::CursorStore;
use crate::url::{is_navigable_href, resolve_href};
use crate::{SweepError, UrlError};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Page and step bounds of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Listing pages walked by a full backfill
    pub max_pages: u32,

    /// Newest listing pages polled by an incremental check
    pub max_checks: u32,

    /// Detail pages followed by one chain walk
    pub max_chain_length: u32,
}

impl From<&EngineConfig> for EngineLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_pages: config.max_pages,
            max_checks: config.max_checks,
            max_chain_length: config.max_chain_length,
        }
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

/// What became of one listing entry
#[derive(Debug)]
enum ItemOutcome {
    Persisted,
    /// Not HTML or nothing extractable; moving on is safe
    Skipped(String),
    /// The detail page could not be fetched
    Unavailable(FetchError),
}

/// Strategy-agnostic orchestrator of fetch, extract, persist and cursor
pub struct CrawlEngine {
    fetcher: Fetcher,
    extractor: Arc<dyn Extract>,
    sink: Arc<dyn RecordSink>,
    cursors: Arc<dyn CursorStore>,
    limits: EngineLimits,
}

impl CrawlEngine {
    pub fn new(
        fetcher: Fetcher,
        extractor: Arc<dyn Extract>,
        sink: Arc<dyn RecordSink>,
        cursors: Arc<dyn CursorStore>,
        limits: EngineLimits,
    ) -> Self {
        Self {
            fetcher,
            extractor,
            sink,
            cursors,
            limits,
        }
    }

    /// Runs one pass over a source
    ///
    /// # Arguments
    ///
    /// * `source` - The source to crawl
    /// * `hint` - Mode preference; `ModeHint::Auto` lets the cursor decide
    /// * `max_pages` - Overrides the source and engine backfill depth
    /// * `max_checks` - Overrides the source and engine incremental depth
    ///
    /// # Returns
    ///
    /// * `Ok(PassReport)` - The pass ran, completed or aborted
    /// * `Err(SweepError)` - The cursor could not be loaded
    pub async fn run_pass(
        &self,
        source: &Source,
        hint: ModeHint,
        max_pages: Option<u32>,
        max_checks: Option<u32>,
    ) -> Result<PassReport, SweepError> {
        let cursor = self.cursors.load(&source.id)?;
        let mode = hint.resolve(&cursor);
        let mut pass = CrawlPass::new(&source.id, mode);

        tracing::info!(source = %source.id, "Starting {} pass", mode);

        let result = if source.pagination.is_chain() {
            self.chain_walk(source, cursor, &mut pass).await
        } else {
            match mode {
                PassMode::FullBackfill => {
                    let pages =
                        max_pages.unwrap_or_else(|| source.max_pages_or(self.limits.max_pages));
                    self.full_backfill(source, &cursor, &mut pass, pages).await
                }
                PassMode::IncrementalCheck => {
                    let checks =
                        max_checks.unwrap_or_else(|| source.max_checks_or(self.limits.max_checks));
                    self.incremental_check(source, cursor, &mut pass, checks).await
                }
            }
        };

        let report = match result {
            Ok(()) => pass.complete(),
            Err(e) => {
                tracing::warn!(source = %source.id, "{} pass aborted: {}", mode, e);
                pass.abort(e.to_string())
            }
        };

        if let Err(e) = self.cursors.record_pass(&report) {
            tracing::warn!(source = %source.id, "Failed to record pass history: {}", e);
        }

        tracing::info!(
            source = %source.id,
            "{} pass finished: {} pages, {} accepted, {} skipped in {:?}",
            report.mode,
            report.pages_visited,
            report.items_accepted,
            report.items_skipped,
            report.elapsed
        );

        Ok(report)
    }

    /// Walks history pages oldest first and saves the cursor only at the end
    ///
    /// An unfetchable listing page aborts the pass with the stored cursor
    /// untouched. Unfetchable detail pages are skipped.
    async fn full_backfill(
        &self,
        source: &Source,
        cursor: &Cursor,
        pass: &mut CrawlPass,
        max_pages: u32,
    ) -> Result<(), SweepError> {
        let mut working = cursor.clone();
        let mut seen_this_pass = HashSet::new();

        for page in source.pagination.reverse_pages(max_pages) {
            let entries = match self.fetch_listing(source, page).await? {
                Some(entries) => entries,
                None => continue,
            };
            pass.pages_visited += 1;

            tracing::debug!(
                source = %source.id,
                "Listing page {} has {} entries",
                page,
                entries.len()
            );

            for entry in entries {
                let key = dedup_key(&entry);
                if seen_this_pass.contains(&key) {
                    tracing::debug!(source = %source.id, "Already handled {} this pass", entry.detail);
                    continue;
                }

                match self.process_entry(source, &entry).await? {
                    ItemOutcome::Persisted => {
                        pass.items_accepted += 1;
                        seen_this_pass.insert(key);
                        working.record(&entry.candidate_id, entry.detail.url.as_str(), source.identity);
                    }
                    ItemOutcome::Skipped(reason) => {
                        tracing::debug!(source = %source.id, "Skipped {}: {}", entry.detail, reason);
                        pass.items_skipped += 1;
                        seen_this_pass.insert(key);
                    }
                    // Left retryable if the entry shows up again on a newer page
                    ItemOutcome::Unavailable(e) => {
                        tracing::warn!(source = %source.id, "Skipping {}: {}", entry.detail, e);
                        pass.items_skipped += 1;
                    }
                }
            }
        }

        working.first_run_complete = true;
        self.cursors.save(&source.id, &working)?;
        Ok(())
    }

    /// Polls the newest pages and accepts entries the cursor has not seen
    ///
    /// The cursor is saved right after each accepted item, so the next
    /// entry is judged against it. Any fetch failure aborts the pass.
    async fn incremental_check(
        &self,
        source: &Source,
        mut cursor: Cursor,
        pass: &mut CrawlPass,
        max_checks: u32,
    ) -> Result<(), SweepError> {
        for page in source.pagination.reverse_pages(max_checks) {
            let entries = match self.fetch_listing(source, page).await? {
                Some(entries) => entries,
                None => continue,
            };
            pass.pages_visited += 1;

            for entry in entries {
                if !cursor.is_new(&entry.candidate_id, source.identity) {
                    continue;
                }

                match self.process_entry(source, &entry).await? {
                    ItemOutcome::Persisted => {
                        pass.items_accepted += 1;
                        tracing::info!(source = %source.id, "New post {}", entry.detail);
                        if cursor.record(&entry.candidate_id, entry.detail.url.as_str(), source.identity) {
                            self.cursors.save(&source.id, &cursor)?;
                        }
                    }
                    ItemOutcome::Skipped(reason) => {
                        tracing::debug!(source = %source.id, "Skipped {}: {}", entry.detail, reason);
                        pass.items_skipped += 1;
                    }
                    ItemOutcome::Unavailable(e) => return Err(e.into()),
                }
            }
        }

        Ok(())
    }

    /// Follows "next post" links from the last emitted detail page
    ///
    /// The starting page is never persisted: it is either the last post
    /// already emitted or the configured start URL, which stands for it on
    /// a first run.
    async fn chain_walk(
        &self,
        source: &Source,
        mut cursor: Cursor,
        pass: &mut CrawlPass,
    ) -> Result<(), SweepError> {
        let mut current = self.chain_origin(source, &cursor)?;

        let mut body = match self.fetch_html(source, &FetchRequest::get(current.clone())).await? {
            Some(body) => body,
            None => {
                tracing::warn!(source = %source.id, "Chain origin {} is not HTML", current);
                return Ok(());
            }
        };
        pass.pages_visited += 1;

        let mut visited = HashSet::from([current.to_string()]);
        let mut walked = 0;

        while walked < self.limits.max_chain_length {
            let next = match next_link(&body, source, &current) {
                Some(next) => next,
                None => break,
            };
            if cursor.is_last_seen_url(next.as_str()) || !visited.insert(next.to_string()) {
                tracing::debug!(source = %source.id, "Chain loops back at {}", next);
                break;
            }

            let page_body = match self.fetch_html(source, &FetchRequest::get(next.clone())).await? {
                Some(body) => body,
                None => {
                    tracing::warn!(source = %source.id, "Chain stops at non-HTML {}", next);
                    break;
                }
            };
            pass.pages_visited += 1;

            let record = match self.extractor.extract(&page_body, source, &next) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(source = %source.id, "Chain stops at {}: {}", next, e);
                    break;
                }
            };

            self.sink.persist(&record).await?;
            pass.items_accepted += 1;
            walked += 1;
            tracing::info!(source = %source.id, "New post {}", next);

            if cursor.mark_chain_position(next.as_str()) {
                self.cursors.save(&source.id, &cursor)?;
            }

            current = next;
            body = page_body;
        }

        if walked == self.limits.max_chain_length {
            tracing::debug!(source = %source.id, "Chain walk hit its length limit");
        }

        if !cursor.first_run_complete {
            cursor.first_run_complete = true;
            self.cursors.save(&source.id, &cursor)?;
        }

        Ok(())
    }

    fn chain_origin(&self, source: &Source, cursor: &Cursor) -> Result<Url, SweepError> {
        if let Some(last) = cursor.last_seen_url.as_deref() {
            match Url::parse(last) {
                Ok(url) => return Ok(url),
                Err(e) => {
                    tracing::warn!(
                        source = %source.id,
                        "Ignoring unusable last-seen URL {}: {}",
                        last,
                        e
                    );
                }
            }
        }

        source
            .pagination
            .chain_start()
            .cloned()
            .ok_or_else(|| UrlError::Unusable(format!("{} has no chain start", source.id)).into())
    }

    /// Fetches and parses one listing page into processing order
    ///
    /// `None` means the page was not HTML and holds nothing to process.
    async fn fetch_listing(
        &self,
        source: &Source,
        page: u32,
    ) -> Result<Option<Vec<ListingEntry>>, SweepError> {
        let request = source.pagination.request_for(page)?;

        match self.fetch_html(source, &request).await? {
            Some(body) => {
                let first_page = source.pagination.is_newest(page);
                Ok(Some(processing_order(parse_listing(&body, source, first_page))))
            }
            None => {
                tracing::warn!(source = %source.id, "Listing {} is not HTML", request);
                Ok(None)
            }
        }
    }

    async fn fetch_html(
        &self,
        source: &Source,
        request: &FetchRequest,
    ) -> Result<Option<String>, FetchError> {
        match self.fetcher.fetch(request, &source.headers).await? {
            FetchOutcome::Html(page) => Ok(Some(page.body)),
            FetchOutcome::Skip { .. } => Ok(None),
        }
    }

    /// Fetches, extracts and persists one detail page
    ///
    /// Only a failing record sink is an error; it stops the pass so the
    /// cursor never moves past an unpersisted item.
    async fn process_entry(
        &self,
        source: &Source,
        entry: &ListingEntry,
    ) -> Result<ItemOutcome, SweepError> {
        let body = match self.fetcher.fetch(&entry.detail.to_request(), &source.headers).await {
            Ok(FetchOutcome::Html(page)) => page.body,
            Ok(FetchOutcome::Skip { content_type }) => {
                return Ok(ItemOutcome::Skipped(format!("content type {}", content_type)))
            }
            Err(e) => return Ok(ItemOutcome::Unavailable(e)),
        };

        let mut record = match self.extractor.extract(&body, source, &entry.detail.url) {
            Ok(record) => record,
            Err(e) => return Ok(ItemOutcome::Skipped(e.to_string())),
        };

        if record.title.is_empty() {
            if let Some(title) = &entry.title_hint {
                record.title = title.clone();
            }
        }
        if record.created_date.is_empty() {
            if let Some(date) = &entry.date_hint {
                record.created_date = match parse_board_date(date) {
                    Some(parsed) => parsed.format("%Y-%m-%d").to_string(),
                    None => date.clone(),
                };
            }
        }

        self.sink.persist(&record).await?;
        Ok(ItemOutcome::Persisted)
    }
}

fn dedup_key(entry: &ListingEntry) -> String {
    if entry.candidate_id.is_empty() {
        format!("url:{}", entry.detail)
    } else {
        format!("id:{}", entry.candidate_id)
    }
}

/// Finds the "next post" link of a chain detail page
///
/// Returns `None` when there is no link, when its text carries a "no next
/// post" marker, or when it is a no-op (`javascript:`, `#`).
fn next_link(html: &str, source: &Source, current: &Url) -> Option<Url> {
    let selector = source.detail.next_link.as_ref()?;
    let document = Html::parse_document(html);
    let element = document.select(selector).next()?;

    let text = element_text(&element);
    if source
        .detail
        .no_next_markers
        .iter()
        .any(|marker| text.contains(marker.as_str()))
    {
        return None;
    }

    // The selector may match the anchor itself or a wrapper around it
    let href = match element.value().attr("href") {
        Some(href) => href,
        None => {
            let anchor = Selector::parse("a[href]").ok()?;
            element.select(&anchor).next()?.value().attr("href")?
        }
    };
    if !is_navigable_href(href) {
        return None;
    }

    let base = source.detail.link_base.as_ref().unwrap_or(current);
    resolve_href(base, href).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::source::SourceRegistry;

    fn chain_source() -> Arc<Source> {
        let config = parse_config(
            r#"
[output]
database-path = "./cursors.db"
records-dir = "./records"

[[source]]
id = "dept"
base-url = "https://dept.example.edu/"
start-url = "https://dept.example.edu/post/10"

[source.pagination]
kind = "chain"

[source.detail]
next-link = "div.next"
no-next-markers = ["no next post"]
"#,
        )
        .unwrap();
        SourceRegistry::build(&config).unwrap().get("dept").unwrap()
    }

    fn current() -> Url {
        Url::parse("https://dept.example.edu/post/10").unwrap()
    }

    #[test]
    fn test_next_link_resolves_against_current_page() {
        let html = r#"<div class="next"><a href="11">Seminar</a></div>"#;
        let next = next_link(html, &chain_source(), &current()).unwrap();
        assert_eq!(next.as_str(), "https://dept.example.edu/post/11");
    }

    #[test]
    fn test_next_link_honors_no_next_marker() {
        let html = r#"<div class="next"><a href="11">There is no next post</a></div>"#;
        assert!(next_link(html, &chain_source(), &current()).is_none());
    }

    #[test]
    fn test_next_link_rejects_noop_links() {
        let html = r#"<div class="next"><a href="javascript:void(0)">Next</a></div>"#;
        assert!(next_link(html, &chain_source(), &current()).is_none());

        let missing = r#"<div class="prev"><a href="9">Prev</a></div>"#;
        assert!(next_link(missing, &chain_source(), &current()).is_none());
    }

    #[test]
    fn test_dedup_key_falls_back_to_url() {
        let entry = ListingEntry {
            detail: crate::crawler::DetailRef::get(current()),
            candidate_id: String::new(),
            ordinal_hint: None,
            pinned: false,
            title_hint: None,
            date_hint: None,
        };
        assert!(dedup_key(&entry).starts_with("url:"));

        let entry = ListingEntry {
            candidate_id: "10".to_string(),
            ..entry
        };
        assert_eq!(dedup_key(&entry), "id:10");
    }

    #[test]
    fn test_limits_from_config() {
        let limits = EngineLimits::default();
        assert_eq!(limits.max_pages, 10);
        assert_eq!(limits.max_checks, 1);
        assert_eq!(limits.max_chain_length, 50);
    }
}
