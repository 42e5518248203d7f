//! In-memory blacklist store.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{BlacklistEntry, BlacklistStore};
use crate::error::StoreError;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<BlacklistEntry>,
    next_id: i64,
}

impl Inner {
    fn contains_ip(&self, ip: &str) -> bool {
        self.entries.iter().any(|e| e.ip_address == ip)
    }

    fn push(&mut self, mut entry: BlacklistEntry) {
        self.next_id += 1;
        entry.id = Some(self.next_id);
        self.entries.push(entry);
    }
}

/// Process-local store. Clones share the same entries.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

impl BlacklistStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<BlacklistEntry>, StoreError> {
        Ok(self.inner.lock().entries.clone())
    }

    async fn save(&self, entry: BlacklistEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.contains_ip(&entry.ip_address) {
            return Err(StoreError::DuplicateIp(entry.ip_address));
        }
        inner.push(entry);
        Ok(())
    }

    async fn save_batch(&self, entries: Vec<BlacklistEntry>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();

        // Validate the whole batch before touching state.
        {
            let mut seen = HashSet::with_capacity(entries.len());
            for entry in &entries {
                if inner.contains_ip(&entry.ip_address) || !seen.insert(entry.ip_address.as_str())
                {
                    return Err(StoreError::DuplicateIp(entry.ip_address.clone()));
                }
            }
        }

        for entry in entries {
            inner.push(entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn should_assign_ids_on_save() {
        let store = MemoryStore::new();
        store.save(BlacklistEntry::new("1.1.1.1", "a.test")).await.unwrap();
        store.save(BlacklistEntry::new("2.2.2.2", "b.test")).await.unwrap();

        let entries = store.load_all().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, Some(1));
        assert_eq!(entries[1].id, Some(2));
    }

    #[tokio::test]
    async fn should_reject_duplicate_ip_on_save() {
        let store = MemoryStore::new();
        store.save(BlacklistEntry::new("1.1.1.1", "a.test")).await.unwrap();

        let result = store.save(BlacklistEntry::new("1.1.1.1", "other.test")).await;

        assert!(matches!(result, Err(StoreError::DuplicateIp(ip)) if ip == "1.1.1.1"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn should_commit_nothing_when_batch_has_duplicate() {
        let store = MemoryStore::new();
        store.save(BlacklistEntry::new("1.1.1.1", "a.test")).await.unwrap();

        let result = store
            .save_batch(vec![
                BlacklistEntry::new("2.2.2.2", "b.test"),
                BlacklistEntry::new("1.1.1.1", "c.test"),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn should_reject_duplicate_within_batch() {
        let store = MemoryStore::new();

        let result = store
            .save_batch(vec![
                BlacklistEntry::new("2.2.2.2", "b.test"),
                BlacklistEntry::new("2.2.2.2", "c.test"),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn should_share_entries_between_clones() {
        let store = MemoryStore::new();
        let other = store.clone();

        store
            .save_batch(vec![BlacklistEntry::new("3.3.3.3", "d.test")])
            .await
            .unwrap();

        assert_eq!(other.load_all().await.unwrap().len(), 1);
    }
}
