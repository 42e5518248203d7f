//! netmonitor - Live packet monitor with a self-updating IP blacklist.
//!
//! netmonitor captures IPv4 traffic on a local interface, classifies each
//! frame, and flags packets whose destination is a known-bad address. The
//! blacklist grows in the background from a remote hosts feed, a batch at a
//! time, resuming where it left off after a restart.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`config`]: Configuration loading and validation
//! - [`network`]: Device selection, capture engine, frame classification
//! - [`sync`]: Incremental blacklist synchronization from the feed
//! - [`store`]: Durable blacklist storage
//! - [`cache`]: Lock-free shared blacklist snapshot
//! - [`resolver`]: Domain name resolution
//! - [`metrics`]: Prometheus metric names and exporter setup
//! - [`error`]: Error types
//!
//! # Testing
//!
//! Capture, storage and resolution sit behind traits, so every component can
//! be exercised without network access or a real interface:
//!
//! ```rust
//! use netmonitor::cache::BlacklistCache;
//! use netmonitor::store::BlacklistEntry;
//!
//! let cache = BlacklistCache::with_entries([BlacklistEntry::new("1.2.3.4", "bad.example")]);
//! assert!(cache.is_blocked("1.2.3.4"));
//! assert!(!cache.is_blocked("5.6.7.8"));
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod network;
pub mod resolver;
pub mod store;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
