//! Candidate identifier derivation
//!
//! Boards encode a post's identity in different places: a query parameter
//! (`articleNo=123`), a numeric path segment (`/notice/123`), an arbitrary
//! pattern inside a `javascript:` href, or nowhere at all (only the title).

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Returns the value of a query parameter, if present and non-empty
pub fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Returns the first path segment made only of ASCII digits
pub fn first_numeric_segment(url: &Url) -> Option<String> {
    url.path_segments()?
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
}

/// Applies a pattern to raw text and returns its first capture group
///
/// Falls back to the whole match when the pattern has no groups.
pub fn regex_capture(pattern: &Regex, text: &str) -> Option<String> {
    let captures = pattern.captures(text)?;
    captures
        .iter()
        .skip(1)
        .flatten()
        .next()
        .or_else(|| captures.get(0))
        .map(|m| m.as_str().to_string())
        .filter(|value| !value.is_empty())
}

/// Hashes a normalized title into a stable opaque identifier
///
/// Whitespace is collapsed first so that cosmetic reflow of a title on the
/// origin does not produce a new identity.
pub fn title_hash(title: &str) -> Option<String> {
    let normalized = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return None;
    }

    let digest = Sha256::digest(normalized.as_bytes());
    Some(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param() {
        let url = Url::parse("https://a.kr/notice/?mode=view&articleNo=1234&x=1").unwrap();
        assert_eq!(query_param(&url, "articleNo"), Some("1234".to_string()));
        assert_eq!(query_param(&url, "missing"), None);
    }

    #[test]
    fn test_empty_query_param_is_none() {
        let url = Url::parse("https://a.kr/view?idx=").unwrap();
        assert_eq!(query_param(&url, "idx"), None);
    }

    #[test]
    fn test_first_numeric_segment() {
        let url = Url::parse("https://a.kr/board/notice/4821/edit").unwrap();
        assert_eq!(first_numeric_segment(&url), Some("4821".to_string()));

        let url = Url::parse("https://a.kr/board/notice").unwrap();
        assert_eq!(first_numeric_segment(&url), None);
    }

    #[test]
    fn test_regex_capture_group() {
        let pattern = Regex::new(r"view\((\d+)\)").unwrap();
        assert_eq!(
            regex_capture(&pattern, "javascript:view(579439)"),
            Some("579439".to_string())
        );
    }

    #[test]
    fn test_regex_without_group_uses_whole_match() {
        let pattern = Regex::new(r"\d{8}").unwrap();
        assert_eq!(
            regex_capture(&pattern, "/blog/notice_20241217_doublemajor/"),
            Some("20241217".to_string())
        );
    }

    #[test]
    fn test_title_hash_ignores_whitespace_reflow() {
        let a = title_hash("Spring  semester\n registration").unwrap();
        let b = title_hash("Spring semester registration").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_eq!(title_hash("   "), None);
    }
}
