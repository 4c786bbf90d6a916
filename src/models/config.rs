//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Registry;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Discovery polling behavior
    #[serde(default)]
    pub poller: PollerConfig,

    /// Verification probe behavior
    #[serde(default)]
    pub probe: ProbeConfig,

    /// HTTP client, throttle, and cache settings
    #[serde(default)]
    pub fetcher: FetcherConfig,

    /// API key and session cookie sources
    #[serde(default)]
    pub credentials: CredentialsConfig,

    /// Log verbosity
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Endpoint catalog
    #[serde(default)]
    pub endpoints: Registry,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.fetcher.user_agent.trim().is_empty() {
            return Err(AppError::validation("fetcher.user_agent is empty"));
        }
        if self.fetcher.timeout_secs == 0 {
            return Err(AppError::validation("fetcher.timeout_secs must be > 0"));
        }
        if self.poller.poll_interval_secs == 0 {
            return Err(AppError::validation("poller.poll_interval_secs must be > 0"));
        }
        if self.probe.growth_rate <= 1.0 {
            return Err(AppError::validation("probe.growth_rate must be > 1.0"));
        }
        if self.probe.article_backoff_ms == 0 || self.probe.feed_backoff_ms == 0 {
            return Err(AppError::validation("probe backoff windows must be > 0"));
        }
        self.endpoints.validate()?;

        // every polled endpoint must exist in the notification catalog
        for name in &self.poller.endpoints {
            self.endpoints.notification(name)?;
        }
        Ok(())
    }
}

/// Discovery poller settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Notification endpoints to poll, by name
    #[serde(default = "defaults::poll_endpoints")]
    pub endpoints: Vec<String>,

    /// Seconds to sleep between cycles
    #[serde(default = "defaults::poll_interval")]
    pub poll_interval_secs: u64,

    /// Lookback window for the `since` field; derived from the poll
    /// interval when unset
    #[serde(default)]
    pub since_secs: Option<u64>,

    /// Number of cycles to run; unbounded when unset
    #[serde(default)]
    pub repeat: Option<u32>,
}

impl PollerConfig {
    /// Effective lookback window: at least one minute more than the poll
    /// interval, rounded to whole minutes.
    pub fn since_secs(&self) -> u64 {
        self.since_secs
            .unwrap_or((self.poll_interval_secs / 60) * 60 + 120)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            endpoints: defaults::poll_endpoints(),
            poll_interval_secs: defaults::poll_interval(),
            since_secs: None,
            repeat: None,
        }
    }
}

/// Verification probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Probe delivery endpoints for each discovered identifier
    #[serde(default)]
    pub articles: bool,

    /// Emit an output event for every article probe attempt (implies
    /// `articles`)
    #[serde(default)]
    pub article_stats: bool,

    /// Probe notification feeds for each identifier from stdin
    #[serde(default)]
    pub feeds: bool,

    /// Emit an output event for every feed probe attempt (implies `feeds`)
    #[serde(default)]
    pub feed_stats: bool,

    /// Exponential backoff growth factor
    #[serde(default = "defaults::growth_rate")]
    pub growth_rate: f64,

    /// Ceiling in ms for the random wait before a probe's first attempt
    #[serde(default = "defaults::initial_wait")]
    pub initial_wait_ms: u64,

    /// Initial backoff window for article probes, in ms
    #[serde(default = "defaults::article_backoff")]
    pub article_backoff_ms: u64,

    /// Give-up ceiling for article probes, in ms
    #[serde(default = "defaults::article_give_up")]
    pub article_give_up_ms: u64,

    /// Initial backoff window for feed probes, in ms
    #[serde(default = "defaults::feed_backoff")]
    pub feed_backoff_ms: u64,

    /// Give-up ceiling for feed probes, in ms
    #[serde(default = "defaults::feed_give_up")]
    pub feed_give_up_ms: u64,

    /// Emit a terminal event when a probe abandons past its ceiling
    #[serde(default)]
    pub report_abandoned: bool,
}

impl ProbeConfig {
    /// Whether article probing is on, directly or via stats capture.
    pub fn articles_enabled(&self) -> bool {
        self.articles || self.article_stats
    }

    /// Whether feed probing is on, directly or via stats capture.
    pub fn feeds_enabled(&self) -> bool {
        self.feeds || self.feed_stats
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            articles: false,
            article_stats: false,
            feeds: false,
            feed_stats: false,
            growth_rate: defaults::growth_rate(),
            initial_wait_ms: defaults::initial_wait(),
            article_backoff_ms: defaults::article_backoff(),
            article_give_up_ms: defaults::article_give_up(),
            feed_backoff_ms: defaults::feed_backoff(),
            feed_give_up_ms: defaults::feed_give_up(),
            report_abandoned: false,
        }
    }
}

/// HTTP client, throttle, and response cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Fixed delay before each uncached request, in ms
    #[serde(default)]
    pub throttle_ms: u64,

    /// Response cache directory; caching is off when unset
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,

    /// Record permanent failures as empty cache entries
    #[serde(default)]
    pub cache_errors: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            throttle_ms: 0,
            cache_dir: None,
            cache_errors: false,
        }
    }
}

/// Credential sources. Inline values win over files; a missing file just
/// disables the corresponding header.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CredentialsConfig {
    /// API key value
    #[serde(default)]
    pub key: Option<String>,

    /// Session cookie value
    #[serde(default)]
    pub cookie: Option<String>,

    /// File to read the key from (default: ~/.ft_api_key)
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// File to read the cookie from (default: ~/.ft_cookie)
    #[serde(default)]
    pub cookie_file: Option<PathBuf>,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (error, warn, info, debug, trace)
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Poller defaults
    pub fn poll_endpoints() -> Vec<String> {
        vec!["API-V2".into(), "API-V1".into()]
    }
    pub fn poll_interval() -> u64 {
        5
    }

    // Probe defaults
    pub fn growth_rate() -> f64 {
        1.1
    }
    pub fn initial_wait() -> u64 {
        2000
    }
    pub fn article_backoff() -> u64 {
        250
    }
    pub fn article_give_up() -> u64 {
        20_000
    }
    pub fn feed_backoff() -> u64 {
        1000
    }
    pub fn feed_give_up() -> u64 {
        100_000
    }

    // Fetcher defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; pubwatch/0.1)".into()
    }
    pub fn timeout() -> u64 {
        30
    }

    // Logging defaults
    pub fn log_level() -> String {
        "warn".into()
    }
}
