use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::http::DEFAULT_USER_AGENTS;

/// Configuration for chapter extraction and backfill
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database and archive locations
    pub storage: StorageConfig,

    /// Remote fetch settings
    pub fetch: FetchConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Archive of raw feeds and chapter indexes. Defaults to `archive`
    /// next to the database.
    pub archive_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Remote chapter indexes fetched concurrently per batch
    pub batch_size: usize,

    /// HTTP request timeout in seconds
    pub request_timeout_seconds: u64,

    /// HTTP connect timeout in seconds
    pub connect_timeout_seconds: u64,

    /// User agents picked at random per request
    pub user_agents: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for this crate's log output
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("podcasts.db"),
            archive_dir: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            request_timeout_seconds: 30,
            connect_timeout_seconds: 10,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn archive_root(&self) -> PathBuf {
        match &self.archive_dir {
            Some(dir) => dir.clone(),
            None => self
                .db_path
                .parent()
                .unwrap_or_else(|| Path::new(""))
                .join("archive"),
        }
    }

    /// Archived feed documents, one per feed title
    pub fn feeds_dir(&self) -> PathBuf {
        self.archive_root().join("feeds")
    }

    /// Cached remote chapter indexes
    pub fn chapters_dir(&self) -> PathBuf {
        self.archive_root().join("chapters")
    }
}

impl Config {
    /// Load configuration from `explicit`, or from the first config file
    /// found in the usual locations, then apply environment overrides
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => {
                let config_str = std::fs::read_to_string(path)
                    .with_context(|| format!("Cannot read config file {}", path.display()))?;
                let config: Config = toml::from_str(&config_str)
                    .with_context(|| format!("Invalid config file {}", path.display()))?;
                tracing::info!("📄 Loaded configuration from: {}", path.display());
                config
            }
            None => Self::search().unwrap_or_default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn search() -> Option<Self> {
        for path in Self::config_paths() {
            if let Ok(config_str) = std::fs::read_to_string(&path) {
                match toml::from_str(&config_str) {
                    Ok(config) => {
                        tracing::info!("📄 Loaded configuration from: {}", path.display());
                        return Some(config);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    }
                }
            }
        }
        None
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("podcast-chapters.toml"),
            PathBuf::from("config/podcast-chapters.toml"),
        ];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("podcast-chapters").join("config.toml"));
        }
        paths
    }

    /// Default configuration with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply `PODCAST_CHAPTERS_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(db) = lookup("PODCAST_CHAPTERS_DB") {
            self.storage.db_path = PathBuf::from(db);
        }

        if let Some(archive) = lookup("PODCAST_CHAPTERS_ARCHIVE") {
            self.storage.archive_dir = Some(PathBuf::from(archive));
        }

        if let Some(batch_size) = lookup("PODCAST_CHAPTERS_BATCH_SIZE") {
            match batch_size.parse() {
                Ok(n) => self.fetch.batch_size = n,
                Err(_) => tracing::warn!("Ignoring invalid PODCAST_CHAPTERS_BATCH_SIZE={}", batch_size),
            }
        }

        if let Some(timeout) = lookup("PODCAST_CHAPTERS_TIMEOUT") {
            match timeout.parse() {
                Ok(n) => self.fetch.request_timeout_seconds = n,
                Err(_) => tracing::warn!("Ignoring invalid PODCAST_CHAPTERS_TIMEOUT={}", timeout),
            }
        }

        if let Some(log_level) = lookup("PODCAST_CHAPTERS_LOG_LEVEL") {
            self.logging.level = log_level;
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config_str = toml::to_string_pretty(self)?;
        std::fs::write(path, config_str)?;
        tracing::info!("💾 Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.fetch.batch_size == 0 {
            return Err(anyhow!("batch_size must be greater than 0"));
        }

        if self.fetch.request_timeout_seconds == 0 || self.fetch.connect_timeout_seconds == 0 {
            return Err(anyhow!("fetch timeouts must be greater than 0"));
        }

        if self.fetch.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(anyhow!("at least one user agent is required"));
        }

        Ok(())
    }

    /// Get runtime configuration summary
    pub fn summary(&self) -> String {
        format!(
            "Podcast Chapters Configuration:\n\
            - Database: {}\n\
            - Archive: {}\n\
            - Batch Size: {}\n\
            - Request Timeout: {}s\n\
            - User Agents: {}",
            self.storage.db_path.display(),
            self.storage.archive_root().display(),
            self.fetch.batch_size,
            self.fetch.request_timeout_seconds,
            self.fetch.user_agents.len()
        )
    }
}

/// Builder for programmatic configuration
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.storage.db_path = path;
        self
    }

    pub fn with_archive_dir(mut self, dir: PathBuf) -> Self {
        self.config.storage.archive_dir = Some(dir);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.fetch.batch_size = batch_size;
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.config.fetch.request_timeout_seconds = seconds;
        self
    }

    pub fn with_user_agents(mut self, user_agents: Vec<String>) -> Self {
        self.config.fetch.user_agents = user_agents;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
