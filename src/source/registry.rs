use crate::config::{
    Config, DetailConfig, IdRuleConfig, ListingConfig, PaginationKind, SourceConfig,
};
use crate::crawler::PaginationStrategy;
use crate::source::{DetailForm, DetailProfile, IdRule, ListingProfile, Source};
use crate::state::IdentityMode;
use crate::ConfigError;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use scraper::Selector;
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Immutable set of compiled sources, in configuration order
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Arc<Source>>,
}

impl SourceRegistry {
    /// Compiles every `[[source]]` entry of a validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SourceRegistry)` - All sources compiled
    /// * `Err(ConfigError)` - A selector, pattern, header or URL did not compile
    pub fn build(config: &Config) -> Result<Self, ConfigError> {
        let sources = config
            .sources
            .iter()
            .map(compile_source)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::from_sources(sources))
    }

    /// Wraps already compiled sources
    pub fn from_sources(sources: Vec<Source>) -> Self {
        Self {
            sources: sources.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Source>> {
        self.sources.iter().find(|s| s.id == id).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Source>> {
        self.sources.iter()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn compile_source(config: &SourceConfig) -> Result<Source, ConfigError> {
    let id = config.id.as_str();
    let base_url = parse_url(&config.base_url)?;

    let pagination = PaginationStrategy::from_config(
        id,
        &config.pagination,
        &base_url,
        config.start_url.as_deref(),
    )?;

    // A lone endpoint gives no page bound to compare ordinals against
    let identity = if config.pagination.kind == PaginationKind::SingleRequest {
        if config.identity == IdentityMode::Ordinal {
            tracing::debug!(source = %id, "single-request source uses membership identity");
        }
        IdentityMode::Membership
    } else {
        config.identity
    };

    let listing = config
        .listing
        .as_ref()
        .map(|listing| compile_listing(id, listing, &base_url))
        .transpose()?;

    Ok(Source {
        id: id.to_string(),
        base_url: base_url.clone(),
        identity,
        pagination,
        listing,
        detail: compile_detail(id, &config.detail, &base_url)?,
        headers: build_headers(id, &config.headers)?,
        max_pages: config.max_pages,
        max_checks: config.max_checks,
    })
}

fn compile_listing(
    id: &str,
    config: &ListingConfig,
    base_url: &Url,
) -> Result<ListingProfile, ConfigError> {
    let id_rule = match &config.id {
        IdRuleConfig::Query { name } => IdRule::QueryParam(name.clone()),
        IdRuleConfig::PathDigits => IdRule::PathDigits,
        IdRuleConfig::Regex { pattern } => {
            let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                source_id: id.to_string(),
                message: e.to_string(),
            })?;
            IdRule::Pattern(regex)
        }
        IdRuleConfig::TitleHash => IdRule::TitleHash,
    };

    Ok(ListingProfile {
        row: compile_selector(id, &config.row)?,
        link: compile_selector(id, &config.link)?,
        title: compile_optional(id, config.title.as_deref())?,
        date: compile_optional(id, config.date.as_deref())?,
        pinned: compile_optional(id, config.pinned.as_deref())?,
        id_rule,
        link_base: match &config.link_base {
            Some(base) => parse_url(base)?,
            None => base_url.clone(),
        },
    })
}

fn compile_detail(
    id: &str,
    config: &DetailConfig,
    base_url: &Url,
) -> Result<DetailProfile, ConfigError> {
    let form_post = match (&config.url, &config.form_field) {
        (Some(url), Some(field)) => Some(DetailForm {
            url: base_url
                .join(url)
                .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", url, e)))?,
            field: field.clone(),
            form: form_pairs(&config.form),
        }),
        _ => None,
    };

    Ok(DetailProfile {
        title: compile_optional(id, config.title.as_deref())?,
        date: compile_optional(id, config.date.as_deref())?,
        author: compile_optional(id, config.author.as_deref())?,
        content: compile_optional(id, config.content.as_deref())?,
        sub_category: compile_optional(id, config.sub_category.as_deref())?,
        next_link: compile_optional(id, config.next_link.as_deref())?,
        no_next_markers: config
            .no_next_markers
            .iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect(),
        link_base: config.link_base.as_deref().map(parse_url).transpose()?,
        form_post,
    })
}

/// Converts a static form table into ordered request pairs
pub(crate) fn form_pairs(form: &BTreeMap<String, String>) -> Vec<(String, String)> {
    form.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn compile_selector(source_id: &str, selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|_| ConfigError::InvalidSelector {
        source_id: source_id.to_string(),
        selector: selector.to_string(),
    })
}

fn compile_optional(
    source_id: &str,
    selector: Option<&str>,
) -> Result<Option<Selector>, ConfigError> {
    selector.map(|s| compile_selector(source_id, s)).transpose()
}

fn build_headers(
    source_id: &str,
    headers: &BTreeMap<String, String>,
) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::new();

    for (name, value) in headers {
        let invalid = || ConfigError::InvalidHeader {
            source_id: source_id.to_string(),
            name: name.clone(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        map.insert(header_name, header_value);
    }

    Ok(map)
}

fn parse_url(value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const CONFIG: &str = r#"
[output]
database-path = "./cursors.db"
records-dir = "./records"

[[source]]
id = "physics"
base-url = "https://physics.example.edu/board/"
max-pages = 3

[source.headers]
Referer = "https://physics.example.edu/"

[source.pagination]
kind = "offset"
template = "list?offset={offset}"

[source.listing]
row = "tr"
link = "a.subject"
id = { kind = "regex", pattern = "view/(\\d+)" }

[source.detail]
content = "div.content"

[[source]]
id = "feed"
base-url = "https://feed.example.edu/"

[source.pagination]
kind = "single-request"
template = "news"

[source.listing]
row = "li"
link = "a"
id = { kind = "path-digits" }
"#;

    #[test]
    fn test_build_registry() {
        let config = parse_config(CONFIG).unwrap();
        let registry = SourceRegistry::build(&config).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["physics", "feed"]);

        let physics = registry.get("physics").unwrap();
        assert_eq!(physics.max_pages_or(10), 3);
        assert_eq!(physics.max_checks_or(1), 1);
        assert_eq!(physics.headers.get("referer").unwrap(), "https://physics.example.edu/");
        assert!(matches!(
            physics.listing.as_ref().unwrap().id_rule,
            IdRule::Pattern(_)
        ));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_single_request_uses_membership() {
        let config = parse_config(CONFIG).unwrap();
        let registry = SourceRegistry::build(&config).unwrap();
        assert_eq!(registry.get("feed").unwrap().identity, IdentityMode::Membership);
        assert_eq!(registry.get("physics").unwrap().identity, IdentityMode::Ordinal);
    }

    #[test]
    fn test_invalid_selector_is_rejected() {
        let config = parse_config(&CONFIG.replace("a.subject", "a[[")).unwrap();
        let result = SourceRegistry::build(&config);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidSelector { ref source_id, .. }) if source_id == "physics"
        ));
    }

    #[test]
    fn test_invalid_regex_is_rejected() {
        let config = parse_config(&CONFIG.replace("view/(\\\\d+)", "view/(")).unwrap();
        assert!(matches!(
            SourceRegistry::build(&config),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_invalid_header_is_rejected() {
        let config = parse_config(&CONFIG.replace("Referer = ", "\"Bad Header\" = ")).unwrap();
        assert!(matches!(
            SourceRegistry::build(&config),
            Err(ConfigError::InvalidHeader { .. })
        ));
    }
}
