use serde::Serialize;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A resolved address of the bucket host with connection tracking
#[derive(Debug)]
pub struct Endpoint {
    /// Resolved IP address
    pub addr: IpAddr,

    /// Number of meta-requests currently dispatched to this endpoint
    pub active_connections: AtomicU32,

    /// Number of consecutive failures (reset on success)
    pub failure_count: AtomicU32,

    /// Meta-requests dispatched over the endpoint's lifetime
    pub requests: AtomicU64,

    /// When the address was first seen by a lookup
    pub resolved_at: Instant,
}

impl Endpoint {
    pub fn new(addr: IpAddr) -> Self {
        Self {
            addr,
            active_connections: AtomicU32::new(0),
            failure_count: AtomicU32::new(0),
            requests: AtomicU64::new(0),
            resolved_at: Instant::now(),
        }
    }

    /// Count a dispatch; the connection is released when the lease drops
    pub fn acquire(self: &Arc<Self>) -> EndpointLease {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.requests.fetch_add(1, Ordering::Relaxed);
        EndpointLease {
            endpoint: Arc::clone(self),
        }
    }

    pub fn get_active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn get_failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }

    pub fn get_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn age(&self) -> Duration {
        self.resolved_at.elapsed()
    }

    pub fn snapshot(&self) -> EndpointSnapshot {
        EndpointSnapshot {
            addr: self.addr,
            active_connections: self.get_active_connections(),
            failure_count: self.get_failure_count(),
            requests: self.get_requests(),
        }
    }
}

/// Active-connection slot on an endpoint
#[derive(Debug)]
pub struct EndpointLease {
    endpoint: Arc<Endpoint>,
}

impl EndpointLease {
    pub fn endpoint(&self) -> &Arc<Endpoint> {
        &self.endpoint
    }
}

impl Drop for EndpointLease {
    fn drop(&mut self) {
        self.endpoint
            .active_connections
            .fetch_sub(1, Ordering::Relaxed);
    }
}

/// Point-in-time view of an endpoint's counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointSnapshot {
    pub addr: IpAddr,
    pub active_connections: u32,
    pub failure_count: u32,
    pub requests: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn endpoint() -> Arc<Endpoint> {
        Arc::new(Endpoint::new("10.0.0.1".parse().unwrap()))
    }

    #[test]
    fn test_endpoint_creation() {
        let endpoint = endpoint();
        assert_eq!(endpoint.addr.to_string(), "10.0.0.1");
        assert_eq!(endpoint.get_active_connections(), 0);
        assert_eq!(endpoint.get_failure_count(), 0);
        assert_eq!(endpoint.get_requests(), 0);
    }

    #[test]
    fn test_lease_tracks_connections() {
        let endpoint = endpoint();

        let first = endpoint.acquire();
        let second = endpoint.acquire();
        assert_eq!(endpoint.get_active_connections(), 2);

        drop(first);
        assert_eq!(endpoint.get_active_connections(), 1);
        drop(second);
        assert_eq!(endpoint.get_active_connections(), 0);
        assert_eq!(endpoint.get_requests(), 2);
    }

    #[test]
    fn test_failure_tracking() {
        let endpoint = endpoint();

        endpoint.record_failure();
        endpoint.record_failure();
        assert_eq!(endpoint.get_failure_count(), 2);

        endpoint.record_success();
        assert_eq!(endpoint.get_failure_count(), 0);
    }

    #[test]
    fn test_concurrent_leases() {
        let endpoint = endpoint();
        let other = Arc::clone(&endpoint);

        let handle = thread::spawn(move || {
            for _ in 0..100 {
                let _lease = other.acquire();
            }
        });

        for _ in 0..100 {
            let _lease = endpoint.acquire();
        }

        handle.join().unwrap();
        assert_eq!(endpoint.get_active_connections(), 0);
        assert_eq!(endpoint.snapshot().requests, 200);
    }
}
