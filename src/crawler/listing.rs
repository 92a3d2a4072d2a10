//! Listing-page parsing
//!
//! Turns one listing page into [`ListingEntry`] values and puts them into the
//! order the engine must process them in. Parsing is synchronous and returns
//! owned data only; no DOM handle outlives the call.

use crate::crawler::fetcher::FetchRequest;
use crate::source::{IdRule, ListingProfile, Source};
use crate::url::{
    first_numeric_segment, is_navigable_href, query_param, regex_capture, resolve_href,
    title_hash,
};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Where a detail page lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRef {
    pub url: Url,
    /// Form body for boards that POST the post number to a fixed URL
    pub form: Option<Vec<(String, String)>>,
}

impl DetailRef {
    pub fn get(url: Url) -> Self {
        Self { url, form: None }
    }

    pub fn to_request(&self) -> FetchRequest {
        match &self.form {
            Some(form) => FetchRequest::post_form(self.url.clone(), form.clone()),
            None => FetchRequest::get(self.url.clone()),
        }
    }
}

impl fmt::Display for DetailRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_request())
    }
}

/// One entry found on a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub detail: DetailRef,
    /// Empty when no identity could be derived
    pub candidate_id: String,
    /// Sort key within one page; never used as identity
    pub ordinal_hint: Option<i64>,
    pub pinned: bool,
    pub title_hint: Option<String>,
    pub date_hint: Option<String>,
}

/// Parses a listing page in document order
///
/// Rows without a usable link are dropped. Pinned rows are dropped unless
/// `first_page` is set, since boards repeat them on every page.
pub fn parse_listing(html: &str, source: &Source, first_page: bool) -> Vec<ListingEntry> {
    let profile = match &source.listing {
        Some(profile) => profile,
        None => return Vec::new(),
    };

    let document = Html::parse_document(html);
    let mut entries = Vec::new();

    for row in document.select(&profile.row) {
        let pinned = profile
            .pinned
            .as_ref()
            .map_or(false, |selector| matches_or_contains(&row, selector));
        if pinned && !first_page {
            continue;
        }

        match parse_row(&row, profile, source, pinned) {
            Some(entry) => entries.push(entry),
            None => tracing::trace!(source = %source.id, "Skipping listing row without a usable link"),
        }
    }

    entries
}

fn parse_row(
    row: &ElementRef,
    profile: &ListingProfile,
    source: &Source,
    pinned: bool,
) -> Option<ListingEntry> {
    let anchor = row.select(&profile.link).next()?;
    let href = anchor.value().attr("href").unwrap_or("").trim();

    let title = profile
        .title
        .as_ref()
        .and_then(|selector| row.select(selector).next())
        .map(|el| element_text(&el))
        .unwrap_or_else(|| element_text(&anchor));

    let resolved = if is_navigable_href(href) {
        resolve_href(&profile.link_base, href).ok()
    } else {
        None
    };

    let candidate_id = match &profile.id_rule {
        IdRule::QueryParam(name) => resolved.as_ref().and_then(|url| query_param(url, name)),
        IdRule::PathDigits => resolved.as_ref().and_then(first_numeric_segment),
        IdRule::Pattern(regex) => regex_capture(regex, href),
        IdRule::TitleHash => title_hash(&title),
    }
    .unwrap_or_default();

    let detail = match &source.detail.form_post {
        Some(form) if !candidate_id.is_empty() => DetailRef {
            url: form.url.clone(),
            form: Some(form.body_for(&candidate_id)),
        },
        Some(_) => return None,
        None => DetailRef::get(resolved?),
    };

    let date_hint = profile
        .date
        .as_ref()
        .and_then(|selector| row.select(selector).next())
        .map(|el| element_text(&el))
        .filter(|text| !text.is_empty());

    let ordinal_hint = if profile.date.is_some() {
        date_hint.as_deref().and_then(date_to_ordinal)
    } else {
        candidate_id.parse::<i64>().ok()
    };

    Some(ListingEntry {
        detail,
        candidate_id,
        ordinal_hint,
        pinned,
        title_hint: Some(title).filter(|t| !t.is_empty()),
        date_hint,
    })
}

/// Puts parsed entries into processing order
///
/// Boards list newest first, so each group is reversed and then stably
/// sorted ascending by ordinal hint (missing hints sort as 0). Ties therefore
/// keep oldest-first order. Pinned entries form their own group appended
/// after the regular ones.
pub fn processing_order(entries: Vec<ListingEntry>) -> Vec<ListingEntry> {
    let (pinned, regular): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| e.pinned);

    let mut ordered = sort_group(regular);
    ordered.extend(sort_group(pinned));
    ordered
}

fn sort_group(mut group: Vec<ListingEntry>) -> Vec<ListingEntry> {
    group.reverse();
    group.sort_by_key(|e| e.ordinal_hint.unwrap_or(0));
    group
}

/// Parses the dates boards print: `2024-03-05`, `2024.03.05`, `2024/3/5`
///
/// Surrounding text (times, labels) is ignored.
pub fn parse_board_date(text: &str) -> Option<NaiveDate> {
    static DATE: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = DATE
        .get_or_init(|| Regex::new(r"(\d{4})\s*[-./]\s*(\d{1,2})\s*[-./]\s*(\d{1,2})").ok())
        .as_ref()?;

    let caps = pattern.captures(text)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

/// `YYYYMMDD` as an integer, used as an ordinal hint
pub fn date_to_ordinal(text: &str) -> Option<i64> {
    parse_board_date(text).map(|date| {
        i64::from(date.year()) * 10_000 + i64::from(date.month()) * 100 + i64::from(date.day())
    })
}

/// Text content of an element with whitespace runs collapsed
pub(crate) fn element_text(element: &ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn matches_or_contains(element: &ElementRef, selector: &Selector) -> bool {
    selector.matches(element) || element.select(selector).next().is_some()
}
