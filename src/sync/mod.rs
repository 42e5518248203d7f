//! Incremental blacklist synchronization.
//!
//! [`BlacklistSynchronizer`] keeps the store and the shared
//! [`BlacklistCache`] in step with the remote feed:
//!
//! 1. Load every stored entry into the cache.
//! 2. Merge the manual blocklist, resolving names not already present.
//! 3. Resume from the saved offset and, every round, take the next batch of
//!    valid feed lines, resolve them, and commit the new IPs as one batch.
//!
//! The offset advances by the batch size after every completed round and is
//! persisted immediately, so a restart never re-reads committed lines. A
//! cancelled round persists nothing.

pub mod batch;
pub mod feed;
pub mod state;

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{BlacklistCache, BlacklistSnapshot};
use crate::config::SyncSettings;
use crate::error::FeedError;
use crate::metrics as names;
use crate::resolver::DomainResolver;
use crate::store::{BlacklistEntry, BlacklistStore};

pub use batch::BatchCollector;
pub use feed::{FeedClient, extract_domain, is_valid_line};
pub use state::SyncStateStore;

/// Background worker that grows the blacklist from the remote feed.
pub struct BlacklistSynchronizer<S, R> {
    store: S,
    resolver: R,
    cache: BlacklistCache,
    state: SyncStateStore,
    feed: FeedClient,
    settings: SyncSettings,
}

impl<S, R> BlacklistSynchronizer<S, R>
where
    S: BlacklistStore,
    R: DomainResolver,
{
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        settings: &SyncSettings,
        store: S,
        resolver: R,
        cache: BlacklistCache,
        state: SyncStateStore,
    ) -> Result<Self, FeedError> {
        Ok(Self {
            store,
            resolver,
            cache,
            state,
            feed: FeedClient::new(settings.request_timeout())?,
            settings: settings.clone(),
        })
    }

    #[must_use]
    pub const fn cache(&self) -> &BlacklistCache {
        &self.cache
    }

    /// Run until `cancel` fires.
    ///
    /// Errors inside a round are logged and the loop keeps going; only
    /// cancellation ends it.
    pub async fn run(&self, cancel: CancellationToken) {
        self.refresh_cache().await;

        let merged = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            added = self.merge_manual_list() => Some(added),
        };
        if merged.is_none() {
            info!("blacklist synchronizer cancelled during startup");
            return;
        }

        let mut offset = self.state.load().await;
        info!(
            offset,
            feed = %self.settings.feed_url,
            batch_size = self.settings.batch_size,
            "starting blacklist sync"
        );

        while !cancel.is_cancelled() {
            let Some(next) = self.advance(offset, &cancel).await else {
                break;
            };
            offset = next;

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.settings.batch_interval()) => {}
            }
        }

        info!(offset, "blacklist synchronizer stopped");
    }

    /// Reload every stored entry and publish it to the cache.
    ///
    /// On a store error the current snapshot is kept.
    pub async fn refresh_cache(&self) -> usize {
        match self.store.load_all().await {
            Ok(entries) => {
                self.cache.replace(entries);
                self.cache.len()
            }
            Err(err) => {
                error!(error = %err, "failed to load blacklist from store, keeping current snapshot");
                self.cache.len()
            }
        }
    }

    /// Resolve and store manual blocklist names not yet present.
    ///
    /// Returns the number of entries added. Running it twice adds nothing
    /// the second time.
    pub async fn merge_manual_list(&self) -> usize {
        let snapshot = self.cache.snapshot();
        let mut chosen_ips = HashSet::new();
        let mut entries = Vec::new();

        for domain in &self.settings.manual_blocklist {
            if snapshot.contains_website(domain) {
                debug!(%domain, "manual entry already blacklisted");
                continue;
            }

            let ip = match self.resolver.resolve(domain).await {
                Ok(ip) => ip.to_string(),
                Err(err) => {
                    warn!(%domain, error = %err, "failed to resolve manual entry");
                    continue;
                }
            };

            if snapshot.contains_ip(&ip) || !chosen_ips.insert(ip.clone()) {
                debug!(%domain, %ip, "manual entry resolves to a blacklisted address");
                continue;
            }
            entries.push(BlacklistEntry::new(ip, domain.as_str()));
        }

        if entries.is_empty() {
            info!("manual blocklist already merged");
            return 0;
        }

        let added = self.commit(entries).await;
        info!(added, "merged manual blocklist");
        added
    }

    /// Run one round from `offset` and persist the next offset.
    ///
    /// Returns `None` if cancelled before the round completed, in which
    /// case nothing is persisted.
    pub async fn advance(&self, offset: u64, cancel: &CancellationToken) -> Option<u64> {
        let added = self.sync_round(offset, cancel).await?;
        let next = offset + self.settings.batch_size as u64;

        if let Err(err) = self.state.save(next).await {
            error!(error = %err, "failed to persist sync offset");
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(names::SYNC_OFFSET).set(next as f64);
        info!(added, offset = next, "blacklist sync round complete");
        Some(next)
    }

    /// Fetch, resolve and commit one batch starting at `offset`.
    ///
    /// Returns the number of entries committed, or `None` if cancelled.
    pub async fn sync_round(&self, offset: u64, cancel: &CancellationToken) -> Option<usize> {
        let snapshot = self.cache.snapshot();

        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return None,
            fetched = self.collect_batch(offset, &snapshot) => fetched,
        };

        match fetched {
            Ok(entries) if entries.is_empty() => {
                debug!(offset, "no new blacklist entries in this batch");
                Some(0)
            }
            Ok(entries) => Some(self.commit(entries).await),
            Err(err) => {
                metrics::counter!(names::FEED_FETCH_FAILURES).increment(1);
                warn!(offset, error = %err, "failed to fetch blacklist feed");
                Some(0)
            }
        }
    }

    async fn collect_batch(
        &self,
        offset: u64,
        snapshot: &BlacklistSnapshot,
    ) -> Result<Vec<BlacklistEntry>, FeedError> {
        let mut lines = self.feed.open(&self.settings.feed_url).await?;
        let mut collector = BatchCollector::new(offset, self.settings.batch_size, snapshot);

        while !collector.is_full() {
            let Some(line) = lines.next_line().await? else {
                break;
            };
            let Some(domain) = collector.candidate(&line) else {
                continue;
            };

            match self.resolver.resolve(domain).await {
                Ok(ip) => {
                    if collector.accept(domain, ip) {
                        debug!(domain, %ip, "queued blacklist entry");
                    }
                }
                Err(err) => debug!(domain, error = %err, "skipping unresolvable domain"),
            }
        }

        debug!(
            skipped = collector.skipped(),
            collected = collector.len(),
            "read blacklist batch"
        );
        Ok(collector.into_entries())
    }

    /// Save `entries` as one batch and republish the cache on success.
    async fn commit(&self, entries: Vec<BlacklistEntry>) -> usize {
        let count = entries.len();
        match self.store.save_batch(entries).await {
            Ok(()) => {
                metrics::counter!(names::ENTRIES_ADDED).increment(count as u64);
                self.refresh_cache().await;
                count
            }
            Err(err) => {
                error!(error = %err, count, "failed to save blacklist batch");
                0
            }
        }
    }
}
