//! Configuration management for PriceWatch
//!
//! Loads from built-in defaults, optional TOML/YAML/JSON files and
//! environment variables (`PRICEWATCH__*`, `.env` honoured).

mod registry;

pub use registry::FeedRegistry;

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::MonitorConfig;
use crate::oracle::sources::{ApiFlavor, HERMES_URL};

/// Invalid feed mapping or settings; fatal at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no price feeds configured")]
    NoFeeds,

    #[error("feed entry has an empty token symbol")]
    EmptyToken,

    #[error("feed id for {0} is empty")]
    EmptyFeedId(String),

    #[error("token {0} is configured more than once")]
    DuplicateToken(String),

    #[error("{role} token {token} has no configured feed")]
    UnknownToken { token: String, role: &'static str },

    #[error("base token {0} is also listed as a comparison token")]
    BaseInComparisons(String),

    #[error("poll interval must be greater than zero")]
    ZeroInterval,

    #[error("oracle timeout must be greater than zero")]
    ZeroTimeout,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_feeds")]
    pub feeds: Vec<FeedEntry>,
    pub monitor: MonitorSettings,
    pub oracle: OracleConfig,
    pub persistence: PersistenceConfig,
    pub logging: LoggingConfig,
}

/// One token → feed id mapping
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedEntry {
    pub token: String,
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    /// Seconds between polling cycles
    pub interval_secs: u64,
    /// Reference token; empty means monitor every feed without comparing
    pub base_token: String,
    /// Tokens compared against the base, in display order
    pub comparison_tokens: Vec<String>,
    /// Run a single cycle and exit
    pub run_once: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    /// Oracle service root URL
    pub base_url: String,
    /// Endpoint/response layout to use
    #[serde(default)]
    pub api_flavor: ApiFlavor,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
    /// Data directory
    pub data_dir: String,
    /// Enable CSV logging
    pub csv_enabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

fn default_feeds() -> Vec<FeedEntry> {
    [
        (
            "BERA",
            "0x962088abcfdbdb6e30db2e340c8cf887d9efb311b1f2f17b155a63dbb6d40265",
        ),
        (
            "iBGT",
            "0xc929105a1af143cbfc887c4573947f54422a9ca88a9e622d151b8abdf5c2962f",
        ),
        (
            "LBGT",
            "0x7d80a0d7344c6632c5ed2b85016f32aed4f831294e274739d92bb9e32df5b22f",
        ),
        (
            "stBGT",
            "0xffd5448b844f5e7eeafbf36c47c7d4791a3cb86f5cefe02a7ba7864b22d81137",
        ),
    ]
    .into_iter()
    .map(|(token, id)| FeedEntry {
        token: token.to_string(),
        id: id.to_string(),
    })
    .collect()
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        // Load .env file first
        dotenvy::dotenv().ok();

        let extra_file = std::env::var("PRICEWATCH_CONFIG").ok();
        Self::load_with(extra_file.as_deref())
    }

    /// Load defaults, the standard config files, an optional explicit file,
    /// then environment overrides
    pub fn load_with(extra_file: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder()
            // Monitor defaults
            .set_default("monitor.interval_secs", 10)?
            .set_default("monitor.base_token", "BERA")?
            .set_default("monitor.comparison_tokens", vec!["iBGT", "LBGT", "stBGT"])?
            .set_default("monitor.run_once", false)?
            // Oracle defaults
            .set_default("oracle.base_url", HERMES_URL)?
            .set_default("oracle.timeout_secs", 10)?
            // Persistence defaults
            .set_default("persistence.data_dir", "./data")?
            .set_default("persistence.csv_enabled", true)?
            // Logging defaults
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load config files if they exist
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false));

        if let Some(path) = extra_file {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let config = builder
            // Override with environment variables (PRICEWATCH__*)
            .add_source(
                Environment::with_prefix("PRICEWATCH")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("monitor.comparison_tokens"),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(app_config)
    }

    /// Check settings and build the feed registry
    pub fn validate(&self) -> Result<FeedRegistry, ConfigError> {
        if self.monitor.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }

        let registry = FeedRegistry::from_entries(&self.feeds)?;

        if let Some(base) = self.base_token() {
            if !registry.contains(base) {
                return Err(ConfigError::UnknownToken {
                    token: base.to_string(),
                    role: "base",
                });
            }
            let tokens = self.comparison_tokens();
            if tokens.contains(&base) {
                return Err(ConfigError::BaseInComparisons(base.to_string()));
            }
            for (i, token) in tokens.iter().enumerate() {
                if !registry.contains(token) {
                    return Err(ConfigError::UnknownToken {
                        token: token.to_string(),
                        role: "comparison",
                    });
                }
                if tokens[..i].contains(token) {
                    return Err(ConfigError::DuplicateToken(token.to_string()));
                }
            }
        }

        Ok(registry)
    }

    /// Configured base token, `None` in monitor-only mode
    pub fn base_token(&self) -> Option<&str> {
        let base = self.monitor.base_token.trim();
        if base.is_empty() {
            None
        } else {
            Some(base)
        }
    }

    /// Comparison tokens with surrounding whitespace removed
    pub fn comparison_tokens(&self) -> Vec<&str> {
        self.monitor
            .comparison_tokens
            .iter()
            .map(|t| t.trim())
            .collect()
    }

    /// Polling-loop settings as an explicit value object
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.monitor.interval_secs),
            base_token: self.base_token().map(str::to_string),
            comparison_tokens: self
                .comparison_tokens()
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle.timeout_secs)
    }

    /// Generate a digest of the config for logging
    pub fn digest(&self) -> String {
        format!(
            "feeds={} base={} compare={:?} interval={}s oracle={} ({:?}) csv={}",
            self.feeds.len(),
            self.base_token().unwrap_or("-"),
            self.monitor.comparison_tokens,
            self.monitor.interval_secs,
            self.oracle.base_url,
            self.oracle.api_flavor,
            self.persistence.csv_enabled
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
