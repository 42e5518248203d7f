//! Error types for netmonitor.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for configuration and exporter setup.
///
/// Runtime failures (capture, storage, feed, state) keep their own enums
/// below and never escape as this type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("metrics error: {0}")]
    Metrics(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    ReadFile(#[source] io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[source] toml::de::Error),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("capture.snapshot_len must be greater than 0")]
    ZeroSnapshotLen,

    #[error("capture.read_timeout_ms must be greater than 0")]
    ZeroReadTimeout,

    #[error("sync.batch_size must be greater than 0")]
    ZeroBatchSize,

    #[error("sync.dns_timeout_ms must be greater than 0")]
    ZeroDnsTimeout,

    #[error("sync.feed_url must start with http:// or https://: {0:?}")]
    InvalidFeedUrl(String),

    #[error("sync.manual_blocklist entries cannot be empty")]
    EmptyManualEntry,

    #[error("interface name cannot be empty")]
    EmptyInterface,
}

/// Network-related errors.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("no network device found")]
    NoDevice,

    #[error("network device {0:?} not found")]
    UnknownDevice(String),

    #[error("failed to open datalink channel on {device}: {reason}")]
    ChannelOpen { device: String, reason: String },

    #[error("unsupported channel type")]
    UnsupportedChannel,

    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[source] io::Error),
}

/// Errors reported by a [`BlacklistStore`](crate::store::BlacklistStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate ip address {0:?}")]
    DuplicateIp(String),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid timestamp {value:?} for entry {ip_address:?}")]
    InvalidTimestamp { ip_address: String, value: String },

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors while fetching the remote feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("HTTP request failed for {url}: status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timeout fetching {url}")]
    Timeout { url: String },

    #[error("error reading feed body from {url}: {source}")]
    Read {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

/// Errors while resolving a blacklisted domain.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("lookup failed for {domain}: {source}")]
    Lookup {
        domain: String,
        #[source]
        source: hickory_resolver::ResolveError,
    },

    #[error("no address found for {0}")]
    NoAddress(String),
}

/// Errors while persisting the synchronization offset.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state I/O error for {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;
