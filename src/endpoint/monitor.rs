use crate::client::MetaRequestType;
use serde::Serialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Result of one meta-request against an endpoint
#[derive(Debug, Clone)]
pub struct EndpointOutcome {
    /// Endpoint chosen for dispatch; `None` when resolved on demand
    pub endpoint: Option<IpAddr>,
    /// Address the connection actually reached, when known
    pub remote_addr: Option<SocketAddr>,
    pub kind: MetaRequestType,
    pub success: bool,
    pub bytes: u64,
    pub latency: Duration,
    pub error_code: Option<&'static str>,
}

/// Hook receiving per-endpoint outcomes for external health tracking.
///
/// Observability only: the transport never evicts endpoints based on it.
pub trait EndpointMonitor: Send + Sync {
    fn on_outcome(&self, outcome: &EndpointOutcome);
}

/// Aggregated statistics for a single endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EndpointStats {
    pub endpoint: Option<IpAddr>,
    pub requests: u64,
    pub successes: u64,
    pub failures: u64,
    pub bytes: u64,
    pub total_latency_ms: u64,
    pub last_error: Option<&'static str>,
}

impl EndpointStats {
    pub fn average_latency(&self) -> Option<Duration> {
        (self.requests > 0).then(|| Duration::from_millis(self.total_latency_ms / self.requests))
    }
}

/// Monitor that keeps per-endpoint counters in memory
#[derive(Debug, Default)]
pub struct EndpointStatsMonitor {
    stats: Mutex<HashMap<Option<IpAddr>, EndpointStats>>,
}

impl EndpointStatsMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics for all endpoints seen, ordered by address
    pub fn get_stats(&self) -> Vec<EndpointStats> {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<EndpointStats> = stats.values().cloned().collect();
        all.sort_by_key(|s| s.endpoint);
        all
    }

    pub fn get(&self, endpoint: Option<IpAddr>) -> Option<EndpointStats> {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&endpoint)
            .cloned()
    }
}

impl EndpointMonitor for EndpointStatsMonitor {
    fn on_outcome(&self, outcome: &EndpointOutcome) {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(outcome.endpoint).or_insert_with(|| EndpointStats {
            endpoint: outcome.endpoint,
            ..EndpointStats::default()
        });

        entry.requests += 1;
        entry.bytes += outcome.bytes;
        entry.total_latency_ms += outcome.latency.as_millis() as u64;
        if outcome.success {
            entry.successes += 1;
        } else {
            entry.failures += 1;
            entry.last_error = outcome.error_code;
        }
    }
}
