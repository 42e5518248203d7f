//! Integration tests for blacklist synchronization.
//!
//! These tests drive the synchronizer against a mock HTTP feed with a fixed
//! resolver, a real SQLite store and a real state file.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use netmonitor::cache::BlacklistCache;
use netmonitor::config::SyncSettings;
use netmonitor::error::ResolveError;
use netmonitor::resolver::DomainResolver;
use netmonitor::store::{BlacklistEntry, BlacklistStore, MemoryStore, SqliteStore};
use netmonitor::sync::{BlacklistSynchronizer, SyncStateStore};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Resolver answering `<n>.test` with `10.0.<n / 256>.<n % 256>`.
#[derive(Clone, Default)]
struct TableResolver {
    overrides: Arc<HashMap<String, IpAddr>>,
}

impl TableResolver {
    fn with_overrides(entries: &[(&str, &str)]) -> Self {
        Self {
            overrides: Arc::new(
                entries
                    .iter()
                    .map(|(d, ip)| ((*d).to_string(), ip.parse().unwrap()))
                    .collect(),
            ),
        }
    }
}

impl DomainResolver for TableResolver {
    async fn resolve(&self, domain: &str) -> Result<IpAddr, ResolveError> {
        if let Some(ip) = self.overrides.get(domain) {
            return Ok(*ip);
        }
        let n: u16 = domain
            .strip_suffix(".test")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| ResolveError::NoAddress(domain.to_string()))?;
        Ok(format!("10.0.{}.{}", n / 256, n % 256).parse().unwrap())
    }
}

fn feed(count: u16) -> String {
    let mut body = String::from("# Title: test hosts\n\n127.0.0.1 localhost\n0.0.0.0 0.0.0.0\n");
    for n in 1..=count {
        body.push_str(&format!("0.0.0.0 {n}.test\n"));
    }
    body
}

async fn serve(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hosts"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;
    server
}

fn settings(server: &MockServer, batch_size: usize, manual: &[&str]) -> SyncSettings {
    SyncSettings {
        feed_url: format!("{}/hosts", server.uri()),
        batch_size,
        batch_interval_ms: 5,
        manual_blocklist: manual.iter().map(ToString::to_string).collect(),
        ..SyncSettings::default()
    }
}

async fn wait_for_len<S: BlacklistStore>(store: &S, len: usize) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while store.load_all().await.unwrap().len() < len {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("store did not reach expected size");
}

#[tokio::test]
async fn should_sync_whole_feed_into_sqlite_and_cache() {
    let server = serve(feed(7)).await;
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open(dir.path().join("blacklist.db")).unwrap();
    let cache = BlacklistCache::new();
    let state = SyncStateStore::new(dir.path().join("state.properties"));
    let sync = BlacklistSynchronizer::new(
        &settings(&server, 3, &[]),
        store.clone(),
        TableResolver::default(),
        cache.clone(),
        state.clone(),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { sync.run(cancel).await }
    });
    wait_for_len(&store, 7).await;
    cancel.cancel();
    handle.await.unwrap();

    let ips: Vec<_> = store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.ip_address)
        .collect();
    assert_eq!(ips[0], "10.0.0.1");
    assert_eq!(ips[6], "10.0.0.7");
    assert!(cache.is_blocked("10.0.0.7"));
    assert!(state.load().await >= 9);
}

#[tokio::test]
async fn should_resume_after_restart_without_duplicates() {
    let server = serve(feed(6)).await;
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("blacklist.db");
    let state_path = dir.path().join("state.properties");

    // First run: a single round of two entries.
    {
        let store = SqliteStore::open(&db).unwrap();
        let sync = BlacklistSynchronizer::new(
            &settings(&server, 2, &[]),
            store.clone(),
            TableResolver::default(),
            BlacklistCache::new(),
            SyncStateStore::new(&state_path),
        )
        .unwrap();
        sync.refresh_cache().await;
        assert_eq!(sync.advance(0, &CancellationToken::new()).await, Some(2));
        assert_eq!(store.load_all().await.unwrap().len(), 2);
    }

    // Second run picks up at the persisted offset.
    let store = SqliteStore::open(&db).unwrap();
    let state = SyncStateStore::new(&state_path);
    assert_eq!(state.load().await, 2);

    let sync = BlacklistSynchronizer::new(
        &settings(&server, 2, &[]),
        store.clone(),
        TableResolver::default(),
        BlacklistCache::new(),
        state,
    )
    .unwrap();
    sync.refresh_cache().await;
    assert_eq!(sync.cache().len(), 2);
    sync.advance(2, &CancellationToken::new()).await;

    let sites: Vec<_> = store
        .load_all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.website_name)
        .collect();
    assert_eq!(sites, vec!["1.test", "2.test", "3.test", "4.test"]);
}

#[tokio::test]
async fn should_merge_manual_list_before_feed() {
    let server = serve(feed(1)).await;
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    let resolver = TableResolver::with_overrides(&[("manual.example", "192.0.2.1")]);
    let sync = BlacklistSynchronizer::new(
        &settings(&server, 10, &["manual.example", "unknown.example"]),
        store.clone(),
        resolver,
        BlacklistCache::new(),
        SyncStateStore::new(dir.path().join("state.properties")),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    let sync = Arc::new(sync);
    let handle = tokio::spawn({
        let sync = Arc::clone(&sync);
        let cancel = cancel.clone();
        async move { sync.run(cancel).await }
    });
    wait_for_len(&store, 2).await;
    cancel.cancel();
    handle.await.unwrap();

    let entries = store.load_all().await.unwrap();
    assert_eq!(entries[0].website_name, "manual.example");
    assert_eq!(entries[1].website_name, "1.test");
    assert_eq!(sync.merge_manual_list().await, 0);
}

#[tokio::test]
async fn should_not_resubmit_ip_already_stored() {
    let server = serve(feed(3)).await;
    let dir = TempDir::new().unwrap();
    let store = MemoryStore::new();
    store
        .save(BlacklistEntry::new("10.0.0.2", "older.test"))
        .await
        .unwrap();
    let sync = BlacklistSynchronizer::new(
        &settings(&server, 10, &[]),
        store.clone(),
        TableResolver::default(),
        BlacklistCache::new(),
        SyncStateStore::new(dir.path().join("state.properties")),
    )
    .unwrap();
    sync.refresh_cache().await;

    assert_eq!(sync.sync_round(0, &CancellationToken::new()).await, Some(2));
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn should_stop_promptly_while_feed_is_slow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/hosts"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(feed(2))
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;
    let dir = TempDir::new().unwrap();
    let state = SyncStateStore::new(dir.path().join("state.properties"));
    let sync = BlacklistSynchronizer::new(
        &settings(&server, 2, &[]),
        MemoryStore::new(),
        TableResolver::default(),
        BlacklistCache::new(),
        state.clone(),
    )
    .unwrap();
    let cancel = CancellationToken::new();

    let handle = tokio::spawn({
        let cancel = cancel.clone();
        async move { sync.run(cancel).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("synchronizer did not stop")
        .unwrap();
    assert!(!state.path().exists());
}
