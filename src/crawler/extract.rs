//! Detail-page extraction
//!
//! The engine depends only on the [`Extract`] trait. [`SelectorExtractor`]
//! is the default implementation, driven by the source's detail selectors.
//! A selector that matches nothing yields an empty field; losing a field is
//! preferred over losing a record.

use crate::crawler::listing::{element_text, parse_board_date};
use crate::source::Source;
use crate::url::{is_navigable_href, resolve_href};
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;
use url::Url;

const ATTACHMENT_EXTENSIONS: &[&str] = &[
    "pdf", "hwp", "hwpx", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "zip", "txt", "csv",
];

const ATTACHMENT_MARKERS: &[&str] = &["download", "filedown", "attach", "file_down"];

/// Extraction failures
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Detail page {url} has no content")]
    EmptyDocument { url: String },
}

/// A linked attachment of an announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
}

/// One normalized announcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub source: String,
    pub url: String,
    pub title: String,
    pub author: String,
    /// `YYYY-MM-DD` when the board's date could be parsed, raw text otherwise
    pub created_date: String,
    pub sub_category: String,
    pub content: String,
    pub raw_html_len: usize,
    pub files: Vec<Attachment>,
    pub images: Vec<String>,
    pub crawled_at: DateTime<Utc>,
}

/// Turns a fetched detail page into a record
///
/// Implementations must be pure: no network access, no shared state.
pub trait Extract: Send + Sync {
    fn extract(&self, raw_html: &str, source: &Source, detail_url: &Url)
        -> Result<Record, ExtractError>;
}

/// Selector-driven extractor built from a source's `[source.detail]` table
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorExtractor;

impl Extract for SelectorExtractor {
    fn extract(
        &self,
        raw_html: &str,
        source: &Source,
        detail_url: &Url,
    ) -> Result<Record, ExtractError> {
        if raw_html.trim().is_empty() {
            return Err(ExtractError::EmptyDocument {
                url: detail_url.to_string(),
            });
        }

        let document = Html::parse_document(raw_html);
        let profile = &source.detail;
        let text_of = |selector: &Option<Selector>| {
            selector
                .as_ref()
                .and_then(|s| document.select(s).next())
                .map(|el| element_text(&el))
                .unwrap_or_default()
        };

        let content_root = profile
            .content
            .as_ref()
            .and_then(|s| document.select(s).next());

        let content = match content_root {
            Some(root) => block_text(&root),
            None => body_text(&document),
        };

        let scope = content_root.unwrap_or_else(|| document.root_element());
        let (files, images) = collect_links(&scope, detail_url);

        let raw_date = text_of(&profile.date);
        let created_date = match parse_board_date(&raw_date) {
            Some(date) => date.format("%Y-%m-%d").to_string(),
            None => raw_date,
        };

        Ok(Record {
            source: source.id.clone(),
            url: detail_url.to_string(),
            title: text_of(&profile.title),
            author: text_of(&profile.author),
            created_date,
            sub_category: text_of(&profile.sub_category),
            content,
            raw_html_len: raw_html.len(),
            files,
            images,
            crawled_at: Utc::now(),
        })
    }
}

/// Text of an element keeping line structure, one trimmed line per text node
fn block_text(element: &ElementRef) -> String {
    element
        .text()
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn body_text(document: &Html) -> String {
    match Selector::parse("body") {
        Ok(selector) => document
            .select(&selector)
            .next()
            .map(|body| block_text(&body))
            .unwrap_or_default(),
        Err(_) => String::new(),
    }
}

fn collect_links(scope: &ElementRef, base: &Url) -> (Vec<Attachment>, Vec<String>) {
    let mut files = Vec::new();
    let mut images = Vec::new();
    let mut seen = HashSet::new();

    if let Ok(anchors) = Selector::parse("a[href]") {
        for anchor in scope.select(&anchors) {
            let href = anchor.value().attr("href").unwrap_or("").trim();
            if !is_navigable_href(href) {
                continue;
            }
            let Ok(url) = resolve_href(base, href) else {
                continue;
            };
            if looks_like_attachment(&url) && seen.insert(url.to_string()) {
                let name = element_text(&anchor);
                files.push(Attachment {
                    name: if name.is_empty() {
                        file_name(&url)
                    } else {
                        name
                    },
                    url: url.to_string(),
                });
            }
        }
    }

    if let Ok(imgs) = Selector::parse("img[src]") {
        for img in scope.select(&imgs) {
            let src = img.value().attr("src").unwrap_or("").trim();
            if src.is_empty() || src.starts_with("data:") {
                continue;
            }
            if let Ok(url) = resolve_href(base, src) {
                if seen.insert(url.to_string()) {
                    images.push(url.to_string());
                }
            }
        }
    }

    (files, images)
}

fn looks_like_attachment(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    let by_extension = path
        .rsplit_once('.')
        .map_or(false, |(_, ext)| ATTACHMENT_EXTENSIONS.contains(&ext));

    let whole = url.as_str().to_ascii_lowercase();
    by_extension || ATTACHMENT_MARKERS.iter().any(|m| whole.contains(m))
}

fn file_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .unwrap_or("attachment")
        .to_string()
}
