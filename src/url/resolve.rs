use crate::UrlError;
use url::Url;

/// Returns false for hrefs that do not point at a fetchable page
///
/// Boards commonly render disabled "next post" links as `javascript:` or
/// fragment-only anchors; those must never be treated as a real link.
pub fn is_navigable_href(href: &str) -> bool {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return false;
    }

    let lower = href.to_ascii_lowercase();
    !(lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:"))
}

/// Resolves an href against a base URL
///
/// # Arguments
///
/// * `base` - The URL the href is relative to
/// * `href` - The raw attribute value
///
/// # Returns
///
/// * `Ok(Url)` - Absolute HTTP(S) URL
/// * `Err(UrlError)` - The href is not navigable or does not resolve
///
/// # Examples
///
/// ```
/// use notice_sweep::url::resolve_href;
/// use url::Url;
///
/// let base = Url::parse("https://board.example.ac.kr/notice/").unwrap();
/// let url = resolve_href(&base, "view.do?articleNo=12").unwrap();
/// assert_eq!(url.as_str(), "https://board.example.ac.kr/notice/view.do?articleNo=12");
/// ```
pub fn resolve_href(base: &Url, href: &str) -> Result<Url, UrlError> {
    if !is_navigable_href(href) {
        return Err(UrlError::Unusable(href.to_string()));
    }

    let url = base
        .join(href.trim())
        .map_err(|e| UrlError::Parse(format!("{}: {}", href, e)))?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(UrlError::Unusable(format!("{} ({} scheme)", href, other))),
    }
}

/// Substitutes a placeholder in a URL template and resolves it against a base
///
/// Templates may be absolute (`https://host/list?page={page}`) or relative to
/// the base URL (`?mode=list&article.offset={offset}`).
pub fn resolve_template(
    base: &Url,
    template: &str,
    placeholder: &'static str,
    value: u64,
) -> Result<Url, UrlError> {
    if !template.contains(placeholder) {
        return Err(UrlError::MissingPlaceholder {
            template: template.to_string(),
            placeholder,
        });
    }

    let filled = template.replace(placeholder, &value.to_string());
    base.join(&filled)
        .map_err(|e| UrlError::Parse(format!("{}: {}", filled, e)))
}
