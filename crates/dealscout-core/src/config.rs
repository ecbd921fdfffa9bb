//! Configuration management for dealscout.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides.

use crate::error::{ConfigError, ConfigResult};
use crate::types::Site;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Main application configuration.
///
/// This is loaded from `~/.config/dealscout/config.toml` (or platform equivalent).
/// If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Proxy source, snapshot and probing settings
    pub proxies: ProxyConfig,
    /// Sites that proxies are health-checked against
    pub sites: Vec<Site>,
    /// Browser automation settings
    pub browser: BrowserConfig,
    /// Enrichment stage settings
    pub enrichment: EnrichmentConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxies: ProxyConfig::default(),
            sites: default_sites(),
            browser: BrowserConfig::default(),
            enrichment: EnrichmentConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `DEALSCOUT_HEADLESS`: Override browser headless mode (true/false)
    /// - `DEALSCOUT_PROXY_SOURCE`: Override the proxy source file path
    /// - `DEALSCOUT_PROBE_TIMEOUT_SECS`: Override the per-probe timeout
    /// - `GOOGLE_API_KEY`, `SEARCH_ENGINE`: Search lookup credentials
    /// - `OPENAI_API_KEY`: Match-scoring credentials
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;
        config.apply_env();
        Ok(config)
    }

    /// Apply environment overrides to an already loaded configuration.
    pub fn apply_env(&mut self) {
        if let Ok(val) = std::env::var("DEALSCOUT_HEADLESS") {
            if let Ok(headless) = val.parse() {
                self.browser.headless = headless;
                tracing::debug!("Override browser.headless from env: {}", headless);
            }
        }

        if let Ok(val) = std::env::var("DEALSCOUT_PROXY_SOURCE") {
            tracing::debug!("Override proxies.source_path from env: {}", val);
            self.proxies.source_path = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("DEALSCOUT_PROBE_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse() {
                self.proxies.probe_timeout_secs = secs;
                tracing::debug!("Override proxies.probe_timeout_secs from env: {}", secs);
            }
        }

        if let Ok(val) = std::env::var("GOOGLE_API_KEY") {
            self.enrichment.search_api_key = Some(val);
        }

        if let Ok(val) = std::env::var("SEARCH_ENGINE") {
            self.enrichment.search_engine_id = val;
        }

        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.enrichment.scoring_api_key = Some(val);
        }
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/dealscout/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "dealscout", "dealscout").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/dealscout`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs =
            ProjectDirs::from("com", "dealscout", "dealscout").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }
}

fn data_file(name: &str) -> PathBuf {
    AppConfig::data_dir()
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| PathBuf::from(name))
}

fn default_sites() -> Vec<Site> {
    [
        ("home_depot", "https://www.homedepot.com"),
        ("lowes", "https://www.lowes.com"),
        ("amazon", "https://www.amazon.com"),
        ("google", "https://www.google.com"),
        ("ace", "https://www.acehardware.com"),
        ("northern_tool", "https://www.northerntool.com"),
        ("sams_club", "https://www.samsclub.com"),
    ]
    .into_iter()
    .filter_map(|(id, url)| Site::new(id, url).ok())
    .collect()
}

/// Proxy source, snapshot and probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Newline-delimited `host:port` source file
    pub source_path: PathBuf,
    /// JSON health snapshot written after every refresh and failure report
    pub snapshot_path: PathBuf,
    /// Timeout for a single (proxy, site) reachability probe
    pub probe_timeout_secs: u64,
    /// Number of probes run at once during a refresh
    pub probe_concurrency: usize,
    /// Restore the persisted snapshot on startup
    pub restore_snapshot: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            source_path: data_file("proxies.txt"),
            snapshot_path: data_file("proxies_status.json"),
            probe_timeout_secs: 20,
            probe_concurrency: 8,
            restore_snapshot: true,
        }
    }
}

/// Browser automation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Run browser in headless mode
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// Navigation timeout in seconds
    pub navigation_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            navigation_timeout_secs: 30,
        }
    }
}

/// Enrichment stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// Site whose listings enrich discovered records
    pub marketplace_site: String,
    /// Custom search endpoint
    pub search_endpoint: String,
    /// Custom search engine identifier (`cx`)
    pub search_engine_id: String,
    /// Search API key (environment only)
    #[serde(skip)]
    pub search_api_key: Option<String>,
    /// Attempts made when the search API answers 429
    pub search_retries: u32,
    /// Base backoff for 429 retries in milliseconds
    pub search_backoff_ms: u64,
    /// Chat completions endpoint used for match scoring
    pub scoring_endpoint: String,
    /// Vision-capable model used for match scoring
    pub scoring_model: String,
    /// Match-scoring API key (environment only)
    #[serde(skip)]
    pub scoring_api_key: Option<String>,
    /// Minimum idle interval of the enrichment drain loop
    pub idle_poll_ms: u64,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            marketplace_site: "amazon".to_string(),
            search_endpoint: "https://www.googleapis.com/customsearch/v1".to_string(),
            search_engine_id: String::new(),
            search_api_key: None,
            search_retries: 5,
            search_backoff_ms: 1000,
            scoring_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            scoring_model: "gpt-4o".to_string(),
            scoring_api_key: None,
            idle_poll_ms: 1000,
        }
    }
}

impl EnrichmentConfig {
    /// Check that every credential the enrichment stage needs is present.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming all missing variables.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut missing = Vec::new();
        if self.scoring_api_key.as_deref().map_or(true, str::is_empty) {
            missing.push("OPENAI_API_KEY");
        }
        if self.search_api_key.as_deref().map_or(true, str::is_empty) {
            missing.push("GOOGLE_API_KEY");
        }
        if self.search_engine_id.is_empty() {
            missing.push("SEARCH_ENGINE");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::InvalidValue {
                field: "enrichment".to_string(),
                reason: format!(
                    "missing required environment variables: {}",
                    missing.join(", ")
                ),
            })
        }
    }
}
