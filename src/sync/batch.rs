//! Per-round batch accounting.
//!
//! [`BatchCollector`] owns the three rules that decide what a round adds:
//! skip the first `offset` valid lines, dedup by resolved IP against the
//! store snapshot and the batch itself, and stop at the batch size.

use std::collections::HashSet;
use std::net::IpAddr;

use super::feed::{extract_domain, is_valid_line};
use crate::cache::BlacklistSnapshot;
use crate::store::BlacklistEntry;

/// Accumulates one round's new entries from feed lines in order.
pub struct BatchCollector<'a> {
    offset: u64,
    batch_size: usize,
    valid_seen: u64,
    existing: &'a BlacklistSnapshot,
    chosen_ips: HashSet<String>,
    entries: Vec<BlacklistEntry>,
}

impl<'a> BatchCollector<'a> {
    #[must_use]
    pub fn new(offset: u64, batch_size: usize, existing: &'a BlacklistSnapshot) -> Self {
        Self {
            offset,
            batch_size,
            valid_seen: 0,
            existing,
            chosen_ips: HashSet::new(),
            entries: Vec::with_capacity(batch_size),
        }
    }

    /// Feed the next line. Returns the domain to resolve, if the line is a
    /// valid entry at or past the offset.
    pub fn candidate<'l>(&mut self, line: &'l str) -> Option<&'l str> {
        if !is_valid_line(line) {
            return None;
        }
        if self.valid_seen < self.offset {
            self.valid_seen += 1;
            return None;
        }
        extract_domain(line)
    }

    /// Record a resolved domain. Returns `false` if the IP is a duplicate.
    pub fn accept(&mut self, domain: &str, ip: IpAddr) -> bool {
        if self.is_full() {
            return false;
        }

        let ip = ip.to_string();
        if self.existing.contains_ip(&ip) || self.chosen_ips.contains(&ip) {
            return false;
        }

        self.chosen_ips.insert(ip.clone());
        self.entries.push(BlacklistEntry::new(ip, domain));
        true
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.batch_size
    }

    /// Valid lines skipped to reach the offset so far.
    #[must_use]
    pub const fn skipped(&self) -> u64 {
        self.valid_seen
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn into_entries(self) -> Vec<BlacklistEntry> {
        self.entries
    }
}
