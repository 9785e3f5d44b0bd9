//! Configuration management for cnpjfinder
//!
//! All configuration is loaded from `./config/cnpjfinder.toml`.
//! No hardcoded defaults exist in source code - all defaults are in the config template.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/cnpjfinder.toml";

/// Default configuration file content - this is the ONLY place defaults exist
pub const DEFAULT_CONFIG: &str = include_str!("../config/cnpjfinder.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Configuration field '{field}' is out of range: {reason}")]
    OutOfRange { field: String, reason: String },
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub http: HttpConfig,
    pub browser: BrowserConfig,
    pub maps: MapsConfig,
    pub scroll: ScrollConfig,
    pub search: SearchConfig,
    pub registry: RegistryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// HTTP client configuration (registry requests)
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

/// Headless Chrome launch configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub headless: bool,
    #[serde(default)]
    pub chrome_path: String,
    pub window_width: u32,
    pub window_height: u32,
    pub idle_timeout_secs: u64,
    pub user_agent: String,
    #[serde(default)]
    pub accept_language: String,
}

impl BrowserConfig {
    /// Configured Chrome binary, if any. Empty string means auto-detect.
    pub fn chrome_path(&self) -> Option<PathBuf> {
        if self.chrome_path.trim().is_empty() {
            None
        } else {
            Some(PathBuf::from(self.chrome_path.trim()))
        }
    }
}

/// Map-search surface: URLs, selectors and timeouts
#[derive(Debug, Clone, Deserialize)]
pub struct MapsConfig {
    pub base_url: String,
    pub feed_selector: String,
    pub entry_selector: String,
    pub phone_xpath: String,
    pub feed_timeout_secs: u64,
    pub phone_timeout_secs: u64,
    #[serde(default = "default_require_phone")]
    pub require_phone: bool,
}

fn default_require_phone() -> bool {
    true
}

impl MapsConfig {
    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed_timeout_secs)
    }

    pub fn phone_timeout(&self) -> Duration {
        Duration::from_secs(self.phone_timeout_secs)
    }
}

/// Feed scrolling behaviour of the collection loop
#[derive(Debug, Clone, Deserialize)]
pub struct ScrollConfig {
    pub step_fraction: f64,
    pub steps_per_pass: u32,
    pub settle_delay_ms: u64,
    pub max_stalled_passes: u32,
    pub max_scroll_passes: u32,
}

impl ScrollConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Web search surface used for CNPJ recovery
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub base_url: String,
    pub snippet_xpath: String,
    pub snippet_marker: String,
    pub results_timeout_secs: u64,
    #[serde(default = "default_validate_check_digits")]
    pub validate_check_digits: bool,
}

fn default_validate_check_digits() -> bool {
    true
}

impl SearchConfig {
    pub fn results_timeout(&self) -> Duration {
        Duration::from_secs(self.results_timeout_secs)
    }
}

/// CNPJ registry (BrasilAPI) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub base_url: String,
    #[serde(default)]
    pub requests_per_second: u32,
}

/// Backoff strategy for retries
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackoffStrategy {
    Linear,
    Exponential,
}

/// Retry configuration shared by browser reads and registry requests
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    pub backoff_strategy: BackoffStrategy,
    pub max_retries: u32,
    pub backoff_base_delay_ms: u64,
    pub backoff_max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff_strategy: BackoffStrategy::Linear,
            max_retries: 3,
            backoff_base_delay_ms: 500,
            backoff_max_delay_ms: 5000,
        }
    }
}

impl RetryConfig {
    /// Delay to wait before retry number `attempt` (1-indexed). Attempt 0 never waits.
    pub fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.backoff_base_delay_ms;
        let delay_ms = match self.backoff_strategy {
            BackoffStrategy::Linear => base.saturating_mul(attempt as u64),
            BackoffStrategy::Exponential => {
                let factor = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
                base.saturating_mul(factor)
            }
        };

        Duration::from_millis(delay_ms.min(self.backoff_max_delay_ms))
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The embedded default configuration
    pub fn default_config() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "http.user_agent".to_string(),
            });
        }
        if self.http.request_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "http.request_timeout_secs".to_string(),
            });
        }

        validate_url("maps.base_url", &self.maps.base_url)?;
        validate_url("search.base_url", &self.search.base_url)?;
        validate_url("registry.base_url", &self.registry.base_url)?;

        for (field, value) in [
            ("maps.feed_selector", &self.maps.feed_selector),
            ("maps.entry_selector", &self.maps.entry_selector),
            ("maps.phone_xpath", &self.maps.phone_xpath),
            ("search.snippet_xpath", &self.search.snippet_xpath),
            ("search.snippet_marker", &self.search.snippet_marker),
            ("browser.user_agent", &self.browser.user_agent),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyRequired { field: field.to_string() });
            }
        }

        if self.maps.feed_timeout_secs == 0 {
            return Err(out_of_range("maps.feed_timeout_secs", "must be greater than 0"));
        }
        if self.search.results_timeout_secs == 0 {
            return Err(out_of_range("search.results_timeout_secs", "must be greater than 0"));
        }
        if !(self.scroll.step_fraction > 0.0 && self.scroll.step_fraction <= 1.0) {
            return Err(out_of_range("scroll.step_fraction", "must be in (0, 1]"));
        }
        if self.scroll.steps_per_pass == 0 {
            return Err(out_of_range("scroll.steps_per_pass", "must be greater than 0"));
        }
        if self.scroll.max_stalled_passes == 0 {
            return Err(out_of_range("scroll.max_stalled_passes", "must be greater than 0"));
        }
        if self.retry.backoff_max_delay_ms < self.retry.backoff_base_delay_ms {
            return Err(out_of_range(
                "retry.backoff_max_delay_ms",
                "must not be smaller than retry.backoff_base_delay_ms",
            ));
        }
        if self.retry.max_retries > 10 {
            return Err(out_of_range("retry.max_retries", "cannot exceed 10"));
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        print!("Configuration file not found. Create default config? [Y/n] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let input = input.trim().to_lowercase();

        if input.is_empty() || input == "y" || input == "yes" {
            let path = Self::create_default_config()?;
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

fn validate_url(field: &str, url: &str) -> Result<(), ConfigError> {
    if url.starts_with("https://") || url.starts_with("http://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            field: field.to_string(),
            url: url.to_string(),
        })
    }
}

fn out_of_range(field: &str, reason: &str) -> ConfigError {
    ConfigError::OutOfRange {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
