use super::endpoint::Endpoint;
use super::resolver::Resolve;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Endpoint selection algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Selection {
    /// Simple sequential distribution
    #[default]
    RoundRobin,
    /// Always pick the endpoint with the fewest active connections
    LeastConnections,
}

impl std::str::FromStr for Selection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" | "roundrobin" => Ok(Selection::RoundRobin),
            "least-connections" | "leastconn" => Ok(Selection::LeastConnections),
            other => Err(format!("unknown selection algorithm: {}", other)),
        }
    }
}

/// Outcome of a warm-up pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Transfers the caller anticipates
    pub requested: usize,
    /// Pool size aimed for: `min(requested, cap)`
    pub target: usize,
    /// Lookups issued
    pub lookups: usize,
    /// Lookups that failed
    pub failures: usize,
    /// Addresses not in the pool before this pass
    pub added: usize,
    /// Pool size after this pass
    pub pool_size: usize,
}

/// Resolved addresses of one host.
///
/// Readers take a snapshot `Arc` and never block on warm-up; warm-up builds a
/// new vector and swaps it in.
#[derive(Debug)]
pub struct EndpointPool {
    host: String,
    cap: usize,
    selection: Selection,
    endpoints: RwLock<Arc<Vec<Arc<Endpoint>>>>,
    counter: AtomicUsize,
}

impl EndpointPool {
    pub fn new(host: impl Into<String>, cap: usize, selection: Selection) -> Self {
        Self {
            host: host.into(),
            cap: cap.max(1),
            selection,
            endpoints: RwLock::new(Arc::new(Vec::new())),
            counter: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    /// Current endpoint set
    pub fn snapshot(&self) -> Arc<Vec<Arc<Endpoint>>> {
        Arc::clone(&self.endpoints.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn addrs(&self) -> Vec<IpAddr> {
        self.snapshot().iter().map(|e| e.addr).collect()
    }

    /// Pick an endpoint for the next dispatch; `None` when the pool is empty
    pub fn select(&self) -> Option<Arc<Endpoint>> {
        let endpoints = self.snapshot();
        if endpoints.is_empty() {
            return None;
        }

        let index = match self.selection {
            Selection::RoundRobin => self.counter.fetch_add(1, Ordering::Relaxed) % endpoints.len(),
            Selection::LeastConnections => endpoints
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.get_active_connections())
                .map(|(idx, _)| idx)?,
        };
        endpoints.get(index).cloned()
    }

    /// Merge `addrs` after the existing entries and keep the first `target`
    /// distinct addresses. Returns how many addresses were new.
    pub fn merge(&self, addrs: &[IpAddr], target: usize) -> usize {
        let target = target.min(self.cap);
        let mut guard = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);

        let mut next: Vec<Arc<Endpoint>> = Vec::with_capacity(target);
        let mut added = 0;
        for endpoint in guard.iter() {
            if next.len() == target {
                break;
            }
            next.push(Arc::clone(endpoint));
        }
        for addr in addrs {
            if next.len() == target {
                break;
            }
            if next.iter().any(|e| e.addr == *addr) {
                continue;
            }
            next.push(Arc::new(Endpoint::new(*addr)));
            added += 1;
        }

        *guard = Arc::new(next);
        added
    }

    /// Replace the whole set with `addrs` (deduplicated, capped)
    pub fn replace(&self, addrs: &[IpAddr]) {
        let mut next: Vec<Arc<Endpoint>> = Vec::new();
        for addr in addrs {
            if next.len() == self.cap {
                break;
            }
            if !next.iter().any(|e| e.addr == *addr) {
                next.push(Arc::new(Endpoint::new(*addr)));
            }
        }
        *self.endpoints.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Grow the pool toward `num_transfers` endpoints.
    ///
    /// Issues up to `min(num_transfers, cap)` concurrent lookups. Failed
    /// lookups are counted, not fatal; when all of them fail the pool is
    /// left as it was.
    pub async fn warm(&self, resolver: &dyn Resolve, num_transfers: usize) -> WarmReport {
        let target = num_transfers.min(self.cap);
        let mut report = WarmReport {
            requested: num_transfers,
            target,
            pool_size: self.len(),
            ..WarmReport::default()
        };
        if target == 0 {
            return report;
        }

        let lookups = (0..target).map(|_| resolver.resolve(&self.host));
        let answers = join_all(lookups).await;
        report.lookups = answers.len();

        let mut addrs: Vec<IpAddr> = Vec::new();
        for answer in answers {
            match answer {
                Ok(ips) => {
                    for ip in ips {
                        if !addrs.contains(&ip) {
                            addrs.push(ip);
                        }
                    }
                }
                Err(e) => {
                    report.failures += 1;
                    warn!(host = %self.host, error = %e, "DNS lookup failed during warm-up");
                }
            }
        }

        if report.failures == report.lookups {
            warn!(
                host = %self.host,
                lookups = report.lookups,
                pool_size = report.pool_size,
                "All warm-up lookups failed, keeping current endpoints"
            );
            return report;
        }

        report.added = self.merge(&addrs, target);
        report.pool_size = self.len();

        debug!(host = %self.host, addrs = ?self.addrs(), "Endpoint pool updated");
        info!(
            host = %self.host,
            target = report.target,
            added = report.added,
            pool_size = report.pool_size,
            failures = report.failures,
            "DNS cache warmed"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::resolver::StaticResolver;
    use futures::future::BoxFuture;
    use std::io;

    fn ip(i: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, i])
    }

    fn pool_with(n: u8, selection: Selection) -> EndpointPool {
        let pool = EndpointPool::new("bench-bucket.s3.us-east-1.amazonaws.com", 16, selection);
        pool.replace(&(1..=n).map(ip).collect::<Vec<_>>());
        pool
    }

    struct FailingResolver;

    impl Resolve for FailingResolver {
        fn resolve(&self, _host: &str) -> BoxFuture<'static, io::Result<Vec<IpAddr>>> {
            Box::pin(async { Err(io::Error::new(io::ErrorKind::Other, "SERVFAIL")) })
        }
    }

    #[test]
    fn test_round_robin() {
        let pool = pool_with(3, Selection::RoundRobin);

        let picks: Vec<IpAddr> = (0..4).map(|_| pool.select().unwrap().addr).collect();
        assert_eq!(picks, vec![ip(1), ip(2), ip(3), ip(1)]);
    }

    #[test]
    fn test_least_connections() {
        let pool = pool_with(3, Selection::LeastConnections);

        let first = pool.select().unwrap();
        let _lease = first.acquire();

        let next = pool.select().unwrap();
        assert_ne!(first.addr, next.addr);
    }

    #[test]
    fn test_empty_pool_selects_nothing() {
        let pool = EndpointPool::new("h", 4, Selection::RoundRobin);
        assert!(pool.select().is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_merge_keeps_existing_first() {
        let pool = pool_with(2, Selection::RoundRobin);
        let existing = pool.snapshot();
        existing[0].record_failure();

        let added = pool.merge(&[ip(2), ip(3), ip(4)], 3);
        assert_eq!(added, 1);
        assert_eq!(pool.addrs(), vec![ip(1), ip(2), ip(3)]);
        // Counters survive the swap
        assert_eq!(pool.snapshot()[0].get_failure_count(), 1);
    }

    #[test]
    fn test_replace_dedupes_and_caps() {
        let pool = EndpointPool::new("h", 2, Selection::RoundRobin);
        pool.replace(&[ip(1), ip(1), ip(2), ip(3)]);
        assert_eq!(pool.addrs(), vec![ip(1), ip(2)]);
    }

    #[tokio::test]
    async fn test_warm_respects_target() {
        let pool = EndpointPool::new("h", 16, Selection::RoundRobin);
        let resolver = StaticResolver::rotating((1..=8).map(ip).collect(), 1);

        let report = pool.warm(&resolver, 5).await;
        assert_eq!(report.target, 5);
        assert_eq!(report.lookups, 5);
        assert_eq!(report.failures, 0);
        assert_eq!(report.pool_size, 5);
        assert_eq!(pool.len(), 5);
    }

    #[tokio::test]
    async fn test_warm_capped() {
        let pool = EndpointPool::new("h", 2, Selection::RoundRobin);
        let resolver = StaticResolver::new((1..=8).map(ip).collect());

        let report = pool.warm(&resolver, 10).await;
        assert_eq!(report.target, 2);
        assert_eq!(pool.len(), 2);
    }

    #[tokio::test]
    async fn test_warm_zero_is_noop() {
        let pool = pool_with(1, Selection::RoundRobin);
        let report = pool.warm(&StaticResolver::new(vec![ip(9)]), 0).await;
        assert_eq!(report.lookups, 0);
        assert_eq!(pool.addrs(), vec![ip(1)]);
    }

    #[tokio::test]
    async fn test_warm_all_failures_keeps_pool() {
        let pool = pool_with(2, Selection::RoundRobin);
        let report = pool.warm(&FailingResolver, 4).await;
        assert_eq!(report.failures, 4);
        assert_eq!(pool.addrs(), vec![ip(1), ip(2)]);
    }

    #[tokio::test]
    async fn test_warm_single_answer() {
        let pool = EndpointPool::new("h", 16, Selection::RoundRobin);
        let report = pool.warm(&StaticResolver::new(vec![ip(7)]), 5).await;
        assert_eq!(report.pool_size, 1);
        assert_eq!(report.added, 1);
    }
}
