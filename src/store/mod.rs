//! Durable blacklist storage.
//!
//! The synchronizer only talks to storage through the [`BlacklistStore`]
//! trait, so the backing technology can be swapped without touching the
//! sync logic:
//!
//! - [`MemoryStore`]: process-local, used when no database is configured
//!   and in tests
//! - [`SqliteStore`]: file-backed store with a `UNIQUE` constraint on the IP

mod memory;
mod sqlite;

use std::future::Future;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::StoreError;

/// One blacklisted address and the domain it was resolved from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlacklistEntry {
    /// Assigned by the store; `None` until persisted.
    pub id: Option<i64>,
    pub ip_address: String,
    pub website_name: String,
    pub created_at: DateTime<Utc>,
}

impl BlacklistEntry {
    /// Create an unsaved entry stamped with the current time.
    pub fn new(ip_address: impl Into<String>, website_name: impl Into<String>) -> Self {
        Self {
            id: None,
            ip_address: ip_address.into(),
            website_name: website_name.into(),
            created_at: Utc::now(),
        }
    }
}

impl std::fmt::Display for BlacklistEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.ip_address, self.website_name)
    }
}

/// Storage contract for blacklist entries.
///
/// Implementations must keep `ip_address` unique. A batch is all-or-nothing:
/// if any entry is rejected, none of the batch is committed and the error is
/// returned to the caller.
pub trait BlacklistStore: Send + Sync + 'static {
    /// Load every stored entry.
    fn load_all(&self) -> impl Future<Output = Result<Vec<BlacklistEntry>, StoreError>> + Send;

    /// Persist a single entry.
    fn save(&self, entry: BlacklistEntry) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Persist a batch of entries atomically.
    fn save_batch(
        &self,
        entries: Vec<BlacklistEntry>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
