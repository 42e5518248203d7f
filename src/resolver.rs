//! Domain name resolution for blacklist entries.
//!
//! Provides abstraction over resolution to enable:
//! - Testing with fixed domain → address tables
//! - Swapping the production resolver configuration

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::{Resolver, ResolverBuilder, TokioResolver};
use tracing::warn;

use crate::error::ResolveError;

/// Trait for resolving a blacklisted domain to the address it points at.
///
/// Failures are expected (domains disappear from DNS all the time); callers
/// skip the domain rather than abort.
pub trait DomainResolver: Send + Sync + 'static {
    fn resolve(&self, domain: &str) -> impl Future<Output = Result<IpAddr, ResolveError>> + Send;
}

/// Production resolver backed by hickory.
///
/// IPv4 answers are preferred because only IPv4 traffic is classified.
pub struct HickoryResolver {
    inner: TokioResolver,
    timeout: Duration,
}

impl HickoryResolver {
    /// Create a resolver from the host's resolver configuration
    /// (`/etc/resolv.conf` and the hosts file), with the given per-query
    /// timeout.
    ///
    /// Falls back to hickory's default upstreams if the host configuration
    /// cannot be read.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut builder = Self::system_builder();
        builder.options_mut().timeout = timeout;

        Self {
            inner: builder.build(),
            timeout,
        }
    }

    fn system_builder() -> ResolverBuilder<TokioConnectionProvider> {
        TokioResolver::builder_tokio().unwrap_or_else(|error| {
            warn!(%error, "cannot read system resolver configuration, using default upstreams");
            Resolver::builder_with_config(ResolverConfig::default(), TokioConnectionProvider::default())
                .with_options(ResolverOpts::default())
        })
    }

    #[must_use]
    pub const fn query_timeout(&self) -> Duration {
        self.timeout
    }
}

impl DomainResolver for HickoryResolver {
    async fn resolve(&self, domain: &str) -> Result<IpAddr, ResolveError> {
        let lookup = self
            .inner
            .lookup_ip(domain)
            .await
            .map_err(|source| ResolveError::Lookup {
                domain: domain.to_string(),
                source,
            })?;

        lookup
            .iter()
            .find(IpAddr::is_ipv4)
            .or_else(|| lookup.iter().next())
            .ok_or_else(|| ResolveError::NoAddress(domain.to_string()))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Resolver answering from a fixed table. Unknown domains fail.
    #[derive(Clone, Default)]
    pub struct MockResolver {
        answers: Arc<HashMap<String, IpAddr>>,
        resolve_count: Arc<AtomicU64>,
    }

    impl MockResolver {
        pub fn new<I, S>(answers: I) -> Self
        where
            I: IntoIterator<Item = (S, &'static str)>,
            S: Into<String>,
        {
            let answers = answers
                .into_iter()
                .map(|(domain, ip)| (domain.into(), ip.parse().unwrap()))
                .collect();
            Self {
                answers: Arc::new(answers),
                resolve_count: Arc::default(),
            }
        }

        pub fn resolve_count(&self) -> u64 {
            self.resolve_count.load(Ordering::SeqCst)
        }
    }

    impl DomainResolver for MockResolver {
        async fn resolve(&self, domain: &str) -> Result<IpAddr, ResolveError> {
            self.resolve_count.fetch_add(1, Ordering::SeqCst);
            self.answers
                .get(domain)
                .copied()
                .ok_or_else(|| ResolveError::NoAddress(domain.to_string()))
        }
    }

    #[tokio::test]
    async fn should_apply_query_timeout_to_system_configuration() {
        let resolver = HickoryResolver::new(Duration::from_millis(1500));

        assert_eq!(resolver.query_timeout(), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn should_resolve_localhost_without_upstream() {
        let resolver = HickoryResolver::new(Duration::from_secs(2));

        let ip = resolver.resolve("localhost").await.unwrap();

        assert!(ip.is_loopback());
    }

    #[tokio::test]
    async fn should_answer_from_table() {
        let resolver = MockResolver::new([("a.test", "10.0.0.1")]);

        let ip = resolver.resolve("a.test").await.unwrap();

        assert_eq!(ip.to_string(), "10.0.0.1");
        assert_eq!(resolver.resolve_count(), 1);
    }

    #[tokio::test]
    async fn should_fail_for_unknown_domain() {
        let resolver = MockResolver::new([("a.test", "10.0.0.1")]);

        let result = resolver.resolve("missing.test").await;

        assert!(matches!(result, Err(ResolveError::NoAddress(d)) if d == "missing.test"));
    }
}
