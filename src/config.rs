//! Configuration loading and validation.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, Result, ValidationError};

/// Hosts feed synchronized by default.
pub const DEFAULT_FEED_URL: &str =
    "https://raw.githubusercontent.com/StevenBlack/hosts/refs/heads/master/alternates/porn/hosts";

/// Main configuration for netmonitor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Network interface to capture on. If None, auto-detect.
    pub interface: Option<String>,

    /// SQLite database holding the blacklist. If None, entries live in memory.
    pub database_path: Option<PathBuf>,

    /// Packet capture settings.
    #[serde(default)]
    pub capture: CaptureSettings,

    /// Blacklist synchronization settings.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Prometheus exporter settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Live capture handle settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureSettings {
    /// Maximum bytes read per frame.
    #[serde(default = "default_snapshot_len")]
    pub snapshot_len: usize,

    /// Read timeout in milliseconds. Only keeps the loop responsive to stop.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Put the interface in promiscuous mode.
    #[serde(default = "default_promiscuous")]
    pub promiscuous: bool,
}

impl CaptureSettings {
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            snapshot_len: default_snapshot_len(),
            read_timeout_ms: default_read_timeout_ms(),
            promiscuous: default_promiscuous(),
        }
    }
}

/// Blacklist synchronization settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    /// Run the synchronizer at all.
    #[serde(default = "default_sync_enabled")]
    pub enabled: bool,

    /// Hosts-format feed to download.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Number of new unique entries collected per round.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between rounds in milliseconds.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,

    /// HTTP timeout for one feed download.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Per-query DNS timeout in milliseconds.
    #[serde(default = "default_dns_timeout_ms")]
    pub dns_timeout_ms: u64,

    /// Where the feed offset is persisted. Defaults to the user data dir.
    pub state_file: Option<PathBuf>,

    /// Domains always blocked, merged once at startup.
    #[serde(default = "default_manual_blocklist")]
    pub manual_blocklist: Vec<String>,
}

impl SyncSettings {
    #[must_use]
    pub const fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }

    /// Returns the configured state file, or the default location.
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(crate::sync::state::default_state_path)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: default_sync_enabled(),
            feed_url: default_feed_url(),
            batch_size: default_batch_size(),
            batch_interval_ms: default_batch_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            dns_timeout_ms: default_dns_timeout_ms(),
            state_file: None,
            manual_blocklist: default_manual_blocklist(),
        }
    }
}

/// Metrics exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Expose a Prometheus `/metrics` endpoint.
    #[serde(default)]
    pub enabled: bool,

    /// Address the exporter listens on.
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

const fn default_snapshot_len() -> usize {
    65536
}

const fn default_read_timeout_ms() -> u64 {
    10
}

const fn default_promiscuous() -> bool {
    true
}

const fn default_sync_enabled() -> bool {
    true
}

fn default_feed_url() -> String {
    DEFAULT_FEED_URL.to_string()
}

const fn default_batch_size() -> usize {
    50
}

const fn default_batch_interval_ms() -> u64 {
    100
}

const fn default_request_timeout_secs() -> u64 {
    30
}

const fn default_dns_timeout_ms() -> u64 {
    3000
}

fn default_manual_blocklist() -> Vec<String> {
    ["pornhub.com", "xhamster.com", "xnxx.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file, or use defaults if it does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.interface.as_deref().is_some_and(str::is_empty) {
            return Err(ValidationError::EmptyInterface);
        }

        if self.capture.snapshot_len == 0 {
            return Err(ValidationError::ZeroSnapshotLen);
        }

        if self.capture.read_timeout_ms == 0 {
            return Err(ValidationError::ZeroReadTimeout);
        }

        if self.sync.batch_size == 0 {
            return Err(ValidationError::ZeroBatchSize);
        }

        if self.sync.dns_timeout_ms == 0 {
            return Err(ValidationError::ZeroDnsTimeout);
        }

        let url = &self.sync.feed_url;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ValidationError::InvalidFeedUrl(url.clone()));
        }

        if self.sync.manual_blocklist.iter().any(|d| d.trim().is_empty()) {
            return Err(ValidationError::EmptyManualEntry);
        }

        Ok(())
    }
}
