use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// Relative `database-path` and `records-dir` entries are resolved against
/// the directory containing the configuration file, so the daemon behaves
/// the same regardless of the working directory it is started from.
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use notice_sweep::config::load_config;
///
/// let config = load_config(Path::new("sweep.toml")).unwrap();
/// println!("Sources: {}", config.sources.len());
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse_config(&content)?;

    if let Some(dir) = path.parent() {
        resolve_relative_paths(&mut config, dir);
    }

    Ok(config)
}

/// Parses and validates configuration text without touching the filesystem
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so two daemons can be checked for running the same
/// source definitions.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

fn resolve_relative_paths(config: &mut Config, dir: &Path) {
    let resolve = |value: &mut String| {
        let candidate = Path::new(value.as_str());
        if candidate.is_relative() && !dir.as_os_str().is_empty() {
            *value = dir.join(candidate).to_string_lossy().into_owned();
        }
    };

    resolve(&mut config.output.database_path);
    resolve(&mut config.output.records_dir);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpMethod, IdRuleConfig, PaginationKind};
    use crate::state::IdentityMode;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID: &str = r#"
[fetcher]
max-attempts = 4
pacing-min-ms = 0
pacing-max-ms = 0

[output]
database-path = "cursors.db"
records-dir = "/var/lib/sweep/records"

[[source]]
id = "physics"
base-url = "https://physics.example.edu/"

[source.pagination]
kind = "offset"
template = "board/list?offset={offset}"

[source.listing]
row = "table.board tbody tr"
link = "td.subject a"
date = "td.date"
pinned = ".notice"
id = { kind = "query", name = "articleNo" }

[source.detail]
title = "h3.title"
content = "div.view-content"

[[source]]
id = "politics"
base-url = "https://politics.example.edu/"
identity = "membership"

[source.pagination]
kind = "page-number"
method = "post"
template = "bbs/list.do"
page-field = "page"
form = { bbsId = "notice" }

[source.listing]
row = "ul.list li"
link = "a"
id = { kind = "title-hash" }
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.fetcher.max_attempts, 4);
        assert_eq!(config.fetcher.initial_backoff_ms, 2_000);
        assert_eq!(config.engine.max_pages, 10);
        assert_eq!(config.scheduler.pool_size, 8);
        assert_eq!(config.sources.len(), 2);

        let physics = &config.sources[0];
        assert_eq!(physics.pagination.kind, PaginationKind::Offset);
        assert_eq!(physics.pagination.page_size, 10);
        assert_eq!(physics.identity, IdentityMode::Ordinal);
        assert!(matches!(
            physics.listing.as_ref().unwrap().id,
            IdRuleConfig::Query { ref name } if name == "articleNo"
        ));

        let politics = &config.sources[1];
        assert_eq!(politics.pagination.method, HttpMethod::Post);
        assert_eq!(politics.identity, IdentityMode::Membership);
        assert_eq!(politics.pagination.form.get("bbsId").unwrap(), "notice");
    }

    #[test]
    fn test_relative_paths_follow_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.toml");
        std::fs::write(&path, VALID).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(
            Path::new(&config.output.database_path),
            dir.path().join("cursors.db")
        );
        assert_eq!(config.output.records_dir, "/var/lib/sweep/records");
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/sweep.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let content = VALID.replace("max-attempts = 4", "max-attempts = 0");
        let result = parse_config(&content);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}
