//! Configuration file parser for ~/.config/alertsync/config.toml.
//!
//! The file holds the store location, the bearer token (unless supplied via
//! `ALERTSYNC_TOKEN`) and the column mappings of the feeds and results tables.
//! A missing file yields `Config::default()`, which then fails [`Config::validate`]
//! because no base id or token is set.
use crate::util::{validate_endpoint, UrlValidationError};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable that overrides the `token` key.
pub const TOKEN_ENV: &str = "ALERTSYNC_TOKEN";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("No store token configured (set `token` or ALERTSYNC_TOKEN)")]
    MissingToken,

    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    #[error("Invalid store endpoint: {0}")]
    InvalidEndpoint(#[from] UrlValidationError),

    #[error("request_timeout_secs must be greater than zero")]
    ZeroTimeout,
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// SEC-015: Custom Debug impl masks `token` to prevent secret leakage
/// in logs, error messages, and debug output.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// REST endpoint of the record store, without the base id.
    pub endpoint: String,

    /// Identifier of the base holding both tables.
    pub base_id: String,

    /// Personal access token (alternative to the ALERTSYNC_TOKEN env var).
    /// Env var takes precedence over config file.
    pub token: Option<String>,

    /// Timeout applied to every feed and store request.
    pub request_timeout_secs: u64,

    /// Column mapping of the table listing the feeds to poll.
    pub feeds: FeedsSchema,

    /// Column mapping of the table receiving new entries.
    pub results: ResultsSchema,
}

/// Column names of the feeds table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedsSchema {
    pub table: String,
    pub keyword_column: String,
    pub url_column: String,
    /// Must be a date-time field; a date-only field loses the time of day.
    pub checkpoint_column: String,
}

/// Column names of the results table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResultsSchema {
    pub table: String,
    pub title_column: String,
    pub link_column: String,
    pub date_column: String,
    /// Link-to-record column referencing the originating feed row.
    pub keyword_column: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://api.airtable.com/v0".to_string(),
            base_id: String::new(),
            token: None,
            request_timeout_secs: 30,
            feeds: FeedsSchema::default(),
            results: ResultsSchema::default(),
        }
    }
}

impl Default for FeedsSchema {
    fn default() -> Self {
        Self {
            table: "Feeds".to_string(),
            keyword_column: "Keyword".to_string(),
            url_column: "Feed URL".to_string(),
            checkpoint_column: "Last Update".to_string(),
        }
    }
}

impl Default for ResultsSchema {
    fn default() -> Self {
        Self {
            table: "Results".to_string(),
            title_column: "Title".to_string(),
            link_column: "Link".to_string(),
            date_column: "Date".to_string(),
            keyword_column: "Keyword".to_string(),
        }
    }
}

/// SEC-015: Mask token in Debug output to prevent secret leakage.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("endpoint", &self.endpoint)
            .field("base_id", &self.base_id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("feeds", &self.feeds)
            .field("results", &self.results)
            .finish()
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → silently accepted (serde default behavior), logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        // Parse as a raw table first to detect unknown keys
        if let Ok(raw) = content.parse::<toml::Table>() {
            warn_unknown_keys(
                &raw,
                "",
                &[
                    "endpoint",
                    "base_id",
                    "token",
                    "request_timeout_secs",
                    "feeds",
                    "results",
                ],
            );
            if let Some(toml::Value::Table(feeds)) = raw.get("feeds") {
                warn_unknown_keys(
                    feeds,
                    "feeds.",
                    &["table", "keyword_column", "url_column", "checkpoint_column"],
                );
            }
            if let Some(toml::Value::Table(results)) = raw.get("results") {
                warn_unknown_keys(
                    results,
                    "results.",
                    &[
                        "table",
                        "title_column",
                        "link_column",
                        "date_column",
                        "keyword_column",
                    ],
                );
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::info!(
            path = %path.display(),
            base_id = %config.base_id,
            feeds_table = %config.feeds.table,
            results_table = %config.results.table,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Checks every setting needed before any request is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_id.trim().is_empty() {
            return Err(ConfigError::MissingSetting("base_id"));
        }
        if self.feeds.table.trim().is_empty() {
            return Err(ConfigError::MissingSetting("feeds.table"));
        }
        if self.results.table.trim().is_empty() {
            return Err(ConfigError::MissingSetting("results.table"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        self.endpoint_url()?;
        self.bearer_token()?;
        Ok(())
    }

    /// The store endpoint, HTTPS-only except for localhost.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Ok(validate_endpoint(&self.endpoint)?)
    }

    /// The bearer token, taken from `ALERTSYNC_TOKEN` when set, else the file.
    pub fn bearer_token(&self) -> Result<SecretString, ConfigError> {
        self.resolve_token(std::env::var(TOKEN_ENV).ok())
    }

    fn resolve_token(&self, env_value: Option<String>) -> Result<SecretString, ConfigError> {
        env_value
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.token.clone().filter(|v| !v.trim().is_empty()))
            .map(|v| SecretString::from(v.trim().to_string()))
            .ok_or(ConfigError::MissingToken)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn warn_unknown_keys(table: &toml::Table, prefix: &str, known_keys: &[&str]) {
    for key in table.keys() {
        if !known_keys.contains(&key.as_str()) {
            tracing::warn!(key = %format!("{prefix}{key}"), "Unknown key in config file, ignoring");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn write_config(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("alertsync_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, content).unwrap();
        path
    }

    fn cleanup(path: &Path) {
        if let Some(dir) = path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    fn valid_config() -> Config {
        Config {
            base_id: "appTEST".to_string(),
            token: Some("pat-file".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, "https://api.airtable.com/v0");
        assert!(config.base_id.is_empty());
        assert!(config.token.is_none());
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.feeds.table, "Feeds");
        assert_eq!(config.results.keyword_column, "Keyword");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/alertsync_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_whitespace_only_file_returns_default() {
        let path = write_config("whitespace", "   \n  \n  ");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds, FeedsSchema::default());
        cleanup(&path);
    }

    #[test]
    fn test_full_config() {
        let content = r#"
endpoint = "https://api.airtable.com/v0"
base_id = "app9RtRrw9rTjgbUZ"
token = "pat-123"
request_timeout_secs = 10

[feeds]
table = "[DRAFT] Keywords"
keyword_column = "Alerts Keyword"
url_column = "RSS Feed"
checkpoint_column = "Last Query"

[results]
table = "Press Coverage"
title_column = "Headline"
link_column = "URL"
date_column = "Date"
keyword_column = "Google Alerts Keyword Group"
"#;
        let path = write_config("full", content);

        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_id, "app9RtRrw9rTjgbUZ");
        assert_eq!(config.token.as_deref(), Some("pat-123"));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.feeds.table, "[DRAFT] Keywords");
        assert_eq!(config.feeds.checkpoint_column, "Last Query");
        assert_eq!(config.results.title_column, "Headline");
        assert_eq!(config.results.keyword_column, "Google Alerts Keyword Group");
        assert!(config.validate().is_ok());

        cleanup(&path);
    }

    #[test]
    fn test_partial_schema_uses_defaults_for_missing() {
        let path = write_config(
            "partial",
            "base_id = \"appX\"\n[feeds]\ntable = \"Keywords\"\n",
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.feeds.table, "Keywords");
        assert_eq!(config.feeds.url_column, "Feed URL"); // default
        assert_eq!(config.results, ResultsSchema::default());

        cleanup(&path);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let path = write_config("invalid", "this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
        cleanup(&path);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let path = write_config("wrongtype", "request_timeout_secs = \"soon\"\n");
        assert!(Config::load(&path).is_err());
        cleanup(&path);
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let path = write_config(
            "unknown",
            "base_id = \"appX\"\ntotally_fake_key = 1\n[feeds]\nbogus = \"x\"\n",
        );
        let config = Config::load(&path).unwrap();
        assert_eq!(config.base_id, "appX");
        cleanup(&path);
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let path = write_config("too_large", &"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
        cleanup(&path);
    }

    #[test]
    fn test_validate_requires_base_id() {
        let config = Config {
            base_id: "  ".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingSetting("base_id"))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = Config {
            request_timeout_secs: 0,
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::ZeroTimeout)));
    }

    #[test]
    fn test_validate_rejects_plain_http_endpoint() {
        let config = Config {
            endpoint: "http://api.airtable.com/v0".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint(
                UrlValidationError::InsecureEndpoint
            ))
        ));
    }

    #[test]
    fn test_env_token_takes_precedence() {
        let config = valid_config();
        let token = config.resolve_token(Some("pat-env".to_string())).unwrap();
        assert_eq!(token.expose_secret(), "pat-env");
    }

    #[test]
    fn test_file_token_used_without_env() {
        let config = valid_config();
        let token = config.resolve_token(None).unwrap();
        assert_eq!(token.expose_secret(), "pat-file");

        // Blank env value falls through to the file
        let token = config.resolve_token(Some("   ".to_string())).unwrap();
        assert_eq!(token.expose_secret(), "pat-file");
    }

    #[test]
    fn test_missing_token() {
        let config = Config {
            token: None,
            ..valid_config()
        };
        assert!(matches!(
            config.resolve_token(None),
            Err(ConfigError::MissingToken)
        ));
    }

    // SEC-015: Debug output masks token
    #[test]
    fn test_debug_masks_token() {
        let config = Config {
            token: Some("super-secret-pat-12345".to_string()),
            ..valid_config()
        };
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("super-secret-pat-12345"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
