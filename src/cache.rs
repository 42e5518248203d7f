//! Shared blacklist snapshot.
//!
//! The synchronizer is the only writer: it builds a complete
//! [`BlacklistSnapshot`] and publishes it with a single atomic swap. The
//! capture engine and any other reader load the current snapshot without
//! locking and never observe a half-built map.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::store::BlacklistEntry;

/// Immutable point-in-time view of every known blacklist entry, keyed by IP.
#[derive(Debug, Default)]
pub struct BlacklistSnapshot {
    by_ip: HashMap<String, BlacklistEntry>,
    /// Lowercased website names.
    websites: HashSet<String>,
}

impl BlacklistSnapshot {
    /// Build a snapshot from a full entry list.
    ///
    /// If the list repeats an IP, the first entry wins.
    pub fn new<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = BlacklistEntry>,
    {
        let mut by_ip = HashMap::new();
        let mut websites = HashSet::new();

        for entry in entries {
            websites.insert(entry.website_name.to_lowercase());
            by_ip.entry(entry.ip_address.clone()).or_insert(entry);
        }

        Self { by_ip, websites }
    }

    /// Exact string match on the IP address.
    #[inline]
    #[must_use]
    pub fn contains_ip(&self, ip: &str) -> bool {
        self.by_ip.contains_key(ip)
    }

    /// Case-insensitive match on the website name.
    #[must_use]
    pub fn contains_website(&self, name: &str) -> bool {
        self.websites.contains(&name.to_lowercase())
    }

    #[must_use]
    pub fn get(&self, ip: &str) -> Option<&BlacklistEntry> {
        self.by_ip.get(ip)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ip.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ip.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &BlacklistEntry> {
        self.by_ip.values()
    }
}

/// Cloneable handle to the latest [`BlacklistSnapshot`].
///
/// Every clone points at the same slot, so a snapshot published through one
/// handle is visible through all of them.
#[derive(Clone, Debug, Default)]
pub struct BlacklistCache {
    current: Arc<ArcSwap<BlacklistSnapshot>>,
}

impl BlacklistCache {
    /// Create a cache holding an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache pre-populated with `entries`.
    #[must_use]
    pub fn with_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = BlacklistEntry>,
    {
        let cache = Self::new();
        cache.replace(entries);
        cache
    }

    /// Current snapshot. Holding the returned `Arc` pins that version.
    #[must_use]
    pub fn snapshot(&self) -> Arc<BlacklistSnapshot> {
        self.current.load_full()
    }

    /// Build a new snapshot from `entries` and publish it atomically.
    pub fn replace<I>(&self, entries: I)
    where
        I: IntoIterator<Item = BlacklistEntry>,
    {
        let snapshot = BlacklistSnapshot::new(entries);
        let count = snapshot.len();
        self.current.store(Arc::new(snapshot));

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(crate::metrics::BLACKLIST_ENTRIES).set(count as f64);
        tracing::debug!(entries = count, "published blacklist snapshot");
    }

    /// Whether `ip` is blacklisted in the current snapshot.
    #[inline]
    #[must_use]
    pub fn is_blocked(&self, ip: &str) -> bool {
        self.current.load().contains_ip(ip)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.current.load().is_empty()
    }
}
