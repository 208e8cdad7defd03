//! Meta-request types and the pooled client interface

use crate::request::HttpRequest;
use crate::transfer::{OutputSink, TransferState};
use futures::future::BoxFuture;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;

/// Storage operation carried by a meta-request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaRequestType {
    Put,
    Get,
}

impl fmt::Display for MetaRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaRequestType::Put => f.write_str("PUT"),
            MetaRequestType::Get => f.write_str("GET"),
        }
    }
}

/// Lifecycle of one meta-request:
/// `Built -> Signing -> Queued -> InFlight -> {Completed | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaRequestState {
    Built,
    Signing,
    Queued,
    InFlight,
    Completed,
    Failed,
}

impl MetaRequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MetaRequestState::Completed | MetaRequestState::Failed)
    }
}

impl fmt::Display for MetaRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetaRequestState::Built => "built",
            MetaRequestState::Signing => "signing",
            MetaRequestState::Queued => "queued",
            MetaRequestState::InFlight => "in_flight",
            MetaRequestState::Completed => "completed",
            MetaRequestState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Network and protocol failures of a meta-request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetaRequestError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("S3 error: {status} - {message}")]
    Http { status: u16, message: String },

    #[error("Body error: {0}")]
    Body(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Throughput {observed} B/s below minimum {minimum} B/s")]
    ThroughputTooLow { observed: u64, minimum: u64 },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl MetaRequestError {
    /// Stable identifier for the failure
    pub fn code(&self) -> &'static str {
        match self {
            MetaRequestError::Connect(_) => "connect_failed",
            MetaRequestError::Http { .. } => "http_status",
            MetaRequestError::Body(_) => "body_error",
            MetaRequestError::Io(_) => "io_error",
            MetaRequestError::Timeout(_) => "timeout",
            MetaRequestError::ThroughputTooLow { .. } => "throughput_too_low",
            MetaRequestError::InvalidRequest(_) => "invalid_request",
        }
    }

    /// Transient failures a client may retry
    pub fn is_retryable(&self) -> bool {
        match self {
            MetaRequestError::Connect(_) | MetaRequestError::Timeout(_) => true,
            MetaRequestError::Http { status, .. } => *status == 429 || *status == 503,
            _ => false,
        }
    }
}

impl From<std::io::Error> for MetaRequestError {
    fn from(err: std::io::Error) -> Self {
        MetaRequestError::Io(err.to_string())
    }
}

/// Opaque handle to the transfer a meta-request belongs to.
///
/// Clients use it to report the InFlight transition and byte progress; they
/// never see the transfer itself.
#[derive(Clone)]
pub struct MetaRequestContext {
    id: u64,
    attempt: u64,
    transfer: Arc<TransferState>,
}

impl MetaRequestContext {
    pub(crate) fn new(id: u64, attempt: u64, transfer: Arc<TransferState>) -> Self {
        Self {
            id,
            attempt,
            transfer,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection acquired, bytes about to move
    pub fn mark_in_flight(&self) {
        self.transfer.set_phase(self.attempt, MetaRequestState::InFlight);
    }

    pub fn record_progress(&self, bytes: u64) {
        self.transfer.record_progress(bytes);
    }

    pub(crate) fn set_phase(&self, state: MetaRequestState) {
        self.transfer.set_phase(self.attempt, state);
    }

    pub(crate) fn complete(&self, result: Result<(), crate::transfer::TransferError>) -> bool {
        self.transfer.complete(self.attempt, result)
    }
}

impl fmt::Debug for MetaRequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaRequestContext")
            .field("id", &self.id)
            .field("attempt", &self.attempt)
            .field("transfer", &self.transfer.id())
            .finish()
    }
}

/// A signed request ready for the pooled client
#[derive(Debug)]
pub struct MetaRequest {
    pub kind: MetaRequestType,
    pub request: HttpRequest,
    /// Address to connect to; `None` resolves the Host on demand
    pub endpoint: Option<IpAddr>,
    /// Destination for response bytes (GET)
    pub sink: Option<OutputSink>,
    pub context: MetaRequestContext,
}

/// Outcome of a successful exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRequestResult {
    pub status: u16,
    /// Body bytes sent (PUT) or received (GET)
    pub bytes: u64,
    pub remote_addr: Option<SocketAddr>,
    pub etag: Option<String>,
}

pub type MetaRequestFuture = BoxFuture<'static, Result<MetaRequestResult, MetaRequestError>>;

/// Pooled connection client that executes meta-requests.
///
/// Owns connection acquisition, queuing, retries, and the runtime the
/// transport's continuations run on.
pub trait MetaRequestClient: Send + Sync {
    fn make_meta_request(&self, meta_request: MetaRequest) -> MetaRequestFuture;

    /// Execution context for meta-request tasks
    fn runtime(&self) -> Handle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(MetaRequestError::Connect("refused".to_string()).is_retryable());
        assert!(MetaRequestError::Http {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(!MetaRequestError::Http {
            status: 403,
            message: String::new()
        }
        .is_retryable());
        assert!(!MetaRequestError::ThroughputTooLow {
            observed: 1,
            minimum: 2
        }
        .is_retryable());
    }

    #[test]
    fn test_state_terminal() {
        assert!(MetaRequestState::Completed.is_terminal());
        assert!(MetaRequestState::Failed.is_terminal());
        assert!(!MetaRequestState::InFlight.is_terminal());
        assert_eq!(MetaRequestState::InFlight.to_string(), "in_flight");
    }

    #[test]
    fn test_context_reports_phase() {
        let transfer = Arc::new(TransferState::new());
        let attempt = transfer.begin("obj").unwrap();
        let context = MetaRequestContext::new(7, attempt, Arc::clone(&transfer));

        context.mark_in_flight();
        context.record_progress(42);
        assert_eq!(
            transfer.status(),
            crate::transfer::TransferStatus::InProgress(MetaRequestState::InFlight)
        );
        assert_eq!(transfer.bytes_transferred(), 42);
        assert_eq!(context.id(), 7);
    }
}
