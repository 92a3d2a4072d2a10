use crate::config::types::{
    Config, DetailConfig, EngineConfig, FetcherConfig, HttpMethod, IdRuleConfig, OutputConfig,
    PaginationConfig, PaginationKind, SchedulerConfig, SourceConfig,
};
use crate::state::IdentityMode;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetcher_config(&config.fetcher)?;
    validate_engine_config(&config.engine)?;
    validate_scheduler_config(&config.scheduler)?;
    validate_output_config(&config.output)?;
    validate_sources(&config.sources)?;
    Ok(())
}

fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetcher.max-attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    if config.initial_backoff_ms > config.max_backoff_ms {
        return Err(ConfigError::Validation(format!(
            "fetcher.initial-backoff-ms ({}) exceeds max-backoff-ms ({})",
            config.initial_backoff_ms, config.max_backoff_ms
        )));
    }

    if config.attempt_timeout_ms == 0 || config.total_budget_ms == 0 {
        return Err(ConfigError::Validation(
            "fetcher timeouts must be greater than zero".to_string(),
        ));
    }

    if config.pacing_min_ms > config.pacing_max_ms {
        return Err(ConfigError::Validation(format!(
            "fetcher.pacing-min-ms ({}) exceeds pacing-max-ms ({})",
            config.pacing_min_ms, config.pacing_max_ms
        )));
    }

    if config.user_agents.iter().all(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "fetcher.user-agents must contain at least one non-empty entry".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "engine.max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.max_checks < 1 {
        return Err(ConfigError::Validation(format!(
            "engine.max-checks must be >= 1, got {}",
            config.max_checks
        )));
    }

    if config.max_chain_length < 1 {
        return Err(ConfigError::Validation(format!(
            "engine.max-chain-length must be >= 1, got {}",
            config.max_chain_length
        )));
    }

    Ok(())
}

fn validate_scheduler_config(config: &SchedulerConfig) -> Result<(), ConfigError> {
    if config.pool_size < 1 || config.pool_size > 64 {
        return Err(ConfigError::Validation(format!(
            "scheduler.pool-size must be between 1 and 64, got {}",
            config.pool_size
        )));
    }

    if config.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "scheduler.interval-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "output.database-path cannot be empty".to_string(),
        ));
    }

    if config.records_dir.is_empty() {
        return Err(ConfigError::Validation(
            "output.records-dir cannot be empty".to_string(),
        ));
    }

    if config.max_log_bytes < 1024 {
        return Err(ConfigError::Validation(format!(
            "output.max-log-bytes must be >= 1024, got {}",
            config.max_log_bytes
        )));
    }

    if let Some(index) = &config.index {
        parse_http_url(&index.endpoint, "output.index.endpoint")?;
        if index.password.is_some() && index.username.is_none() {
            return Err(ConfigError::Validation(
                "output.index.password requires a username".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_sources(sources: &[SourceConfig]) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for source in sources {
        validate_source_id(&source.id)?;
        if !seen.insert(source.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate source id '{}'",
                source.id
            )));
        }

        parse_http_url(&source.base_url, &format!("source '{}' base-url", source.id))?;
        validate_pagination(source, &source.pagination)?;
        validate_listing(source)?;
        validate_detail(source, &source.detail)?;

        if source.max_pages == Some(0) || source.max_checks == Some(0) {
            return Err(ConfigError::Validation(format!(
                "Source '{}' page limits must be >= 1",
                source.id
            )));
        }
    }

    Ok(())
}

/// Source ids double as file name suffixes, so keep them simple
fn validate_source_id(id: &str) -> Result<(), ConfigError> {
    if id.is_empty() {
        return Err(ConfigError::Validation(
            "source id cannot be empty".to_string(),
        ));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "source id must contain only ASCII letters, digits, '-' and '_', got '{}'",
            id
        )));
    }

    Ok(())
}

fn validate_pagination(source: &SourceConfig, config: &PaginationConfig) -> Result<(), ConfigError> {
    let id = &source.id;

    match config.kind {
        PaginationKind::Offset | PaginationKind::PageNumber => {
            let template = config.template.as_deref().ok_or_else(|| {
                ConfigError::Validation(format!("Source '{}' pagination needs a template", id))
            })?;

            match config.method {
                HttpMethod::Get => {
                    let placeholder = if config.kind == PaginationKind::Offset {
                        "{offset}"
                    } else {
                        "{page}"
                    };
                    if !template.contains(placeholder) {
                        return Err(ConfigError::Validation(format!(
                            "Source '{}' template '{}' must contain {}",
                            id, template, placeholder
                        )));
                    }
                }
                HttpMethod::Post => {
                    if config.page_field.as_deref().map_or(true, str::is_empty) {
                        return Err(ConfigError::Validation(format!(
                            "Source '{}' POST pagination needs a page-field",
                            id
                        )));
                    }
                }
            }

            if config.kind == PaginationKind::Offset && config.page_size < 1 {
                return Err(ConfigError::Validation(format!(
                    "Source '{}' page-size must be >= 1",
                    id
                )));
            }
        }
        PaginationKind::SingleRequest => {
            if config.template.is_none() && source.start_url.is_none() {
                return Err(ConfigError::Validation(format!(
                    "Source '{}' single-request pagination needs a template or start-url",
                    id
                )));
            }
        }
        PaginationKind::Chain => {
            if source.start_url.is_none() {
                return Err(ConfigError::Validation(format!(
                    "Source '{}' chain pagination needs a start-url",
                    id
                )));
            }
            if source.detail.next_link.is_none() {
                return Err(ConfigError::Validation(format!(
                    "Source '{}' chain pagination needs detail.next-link",
                    id
                )));
            }
        }
    }

    if config.first_page_template.is_some() && config.kind != PaginationKind::PageNumber {
        return Err(ConfigError::Validation(format!(
            "Source '{}' first-page-template only applies to page-number pagination",
            id
        )));
    }

    Ok(())
}

fn validate_listing(source: &SourceConfig) -> Result<(), ConfigError> {
    let listing = match (&source.listing, source.pagination.kind) {
        (Some(listing), _) => listing,
        (None, PaginationKind::Chain) => return Ok(()),
        (None, _) => {
            return Err(ConfigError::Validation(format!(
                "Source '{}' needs a [source.listing] table",
                source.id
            )))
        }
    };

    if let IdRuleConfig::TitleHash = listing.id {
        if source.identity != IdentityMode::Membership {
            return Err(ConfigError::Validation(format!(
                "Source '{}' uses title-hash ids, which cannot be ordered; set identity = \"membership\"",
                source.id
            )));
        }
    }

    if let Some(base) = &listing.link_base {
        parse_http_url(base, &format!("source '{}' listing.link-base", source.id))?;
    }

    Ok(())
}

fn validate_detail(source: &SourceConfig, detail: &DetailConfig) -> Result<(), ConfigError> {
    if detail.form_field.is_some() != detail.url.is_some() {
        return Err(ConfigError::Validation(format!(
            "Source '{}' detail.url and detail.form-field must be set together",
            source.id
        )));
    }

    if let Some(base) = &detail.link_base {
        parse_http_url(base, &format!("source '{}' detail.link-base", source.id))?;
    }

    Ok(())
}

fn parse_http_url(value: &str, context: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", context, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            context, value
        )));
    }

    Ok(url)
}
