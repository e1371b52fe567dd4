//! Configuration management.

mod file_config;

pub use file_config::{ConfigFile, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::crawl::{CrawlSettings, EmptyPagePolicy, ProducerOptions, DEFAULT_QUEUE_CAPACITY};

/// Name of the configuration file looked up by [`find_config_file`]
pub const CONFIG_FILE_NAME: &str = "research-crawler.toml";

/// Prefix of environment variables overriding file settings,
/// e.g. `RESEARCH_CRAWLER_DATABASE__URL`
pub const ENV_PREFIX: &str = "RESEARCH_CRAWLER";

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Document store settings
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Hand-off queue settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Producer and HTTP settings
    #[serde(default)]
    pub crawl: CrawlConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Session settings derived from this configuration
    pub fn crawl_settings(&self) -> CrawlSettings {
        CrawlSettings {
            queue_capacity: self.queue.capacity,
            producer: ProducerOptions {
                empty_page_policy: self.crawl.empty_page_policy,
                max_pages: self.crawl.max_pages,
            },
        }
    }
}

/// CouchDB connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Server base URL
    #[serde(default = "default_database_url")]
    pub url: String,

    #[serde(default = "default_username", skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(default = "default_password", skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Database holding research items
    #[serde(default = "default_database_name")]
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            username: default_username(),
            password: default_password(),
            name: default_database_name(),
        }
    }
}

fn default_database_url() -> String {
    "http://localhost:5984".to_string()
}

fn default_username() -> Option<String> {
    Some("admin".to_string())
}

fn default_password() -> Option<String> {
    Some("admin".to_string())
}

fn default_database_name() -> String {
    "research_items".to_string()
}

/// Hand-off queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of items waiting between producer and consumer
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

/// Producer and HTTP client settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// What to do after a page without items
    #[serde(default)]
    pub empty_page_policy: EmptyPagePolicy,

    /// Upper bound on pages fetched per run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,

    /// User agent sent with every request (defaults to the crate's own)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            empty_page_policy: EmptyPagePolicy::default(),
            max_pages: None,
            user_agent: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl CrawlConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_timeout_secs() -> u64 {
    30
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load configuration from a file, applying `RESEARCH_CRAWLER_*` environment overrides
pub fn load_config(path: &Path) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(env_source())
        .build()?;

    settings.try_deserialize()
}

/// Configuration from defaults and environment overrides only
pub fn get_config() -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder().add_source(env_source()).build()?;

    settings.try_deserialize()
}

fn env_source() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

/// First existing configuration file among the current directory and the
/// platform configuration directory
pub fn find_config_file() -> Option<PathBuf> {
    let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("research-crawler").join("config.toml"));
    }

    candidates.into_iter().find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.url, "http://localhost:5984");
        assert_eq!(config.database.username.as_deref(), Some("admin"));
        assert_eq!(config.database.name, "research_items");
        assert_eq!(config.queue.capacity, 500);
        assert_eq!(config.crawl.empty_page_policy, EmptyPagePolicy::Stop);
        assert_eq!(config.crawl.timeout(), Duration::from_secs(30));
        assert_eq!(config.logging.format, LogFormat::Text);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawler.toml");
        std::fs::write(
            &path,
            r#"
[database]
url = "http://couch.internal:5984"
name = "preprints"

[queue]
capacity = 20

[crawl]
empty_page_policy = "fetch-next"
max_pages = 3

[logging]
format = "json"
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.database.url, "http://couch.internal:5984");
        assert_eq!(config.database.name, "preprints");
        assert_eq!(config.database.username.as_deref(), Some("admin"));
        assert_eq!(config.database.password.as_deref(), Some("admin"));
        assert_eq!(config.crawl.timeout_secs, 30);
        assert_eq!(config.logging.format, LogFormat::Json);

        let settings = config.crawl_settings();
        assert_eq!(settings.queue_capacity, 20);
        assert_eq!(settings.producer.empty_page_policy, EmptyPagePolicy::FetchNext);
        assert_eq!(settings.producer.max_pages, Some(3));
    }

    #[test]
    fn test_env_overrides_keep_other_defaults() {
        std::env::set_var("RESEARCH_CRAWLER_CRAWL__USER_AGENT", "env-agent/2.0");
        let config = get_config();
        std::env::remove_var("RESEARCH_CRAWLER_CRAWL__USER_AGENT");

        let config = config.unwrap();
        assert_eq!(config.crawl.user_agent.as_deref(), Some("env-agent/2.0"));
        assert_eq!(config.crawl.timeout_secs, 30);
        assert_eq!(config.database.username.as_deref(), Some("admin"));
        assert_eq!(config.database.password.as_deref(), Some("admin"));
        assert_eq!(config.queue.capacity, 500);
    }

    #[test]
    fn test_partial_database_section_keeps_credentials() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("crawler.toml");
        std::fs::write(&path, "[database]\nurl = \"http://db:5984\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.database.url, "http://db:5984");
        assert_eq!(config.database.username.as_deref(), Some("admin"));
        assert_eq!(config.database.password.as_deref(), Some("admin"));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config(Path::new("/nonexistent/research-crawler.toml"));
        assert!(result.is_err());
    }
}
