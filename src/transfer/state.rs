//! Per-transfer identity, progress, and terminal status

use super::stream::{InputStream, OutputSink};
use crate::auth::SigningError;
use crate::client::{MetaRequestError, MetaRequestState};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;

static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

/// Terminal failure recorded on a transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("No request body attached to the transfer")]
    MissingBody,

    #[error("Request body length is indeterminate")]
    IndeterminateLength,

    #[error("No output sink attached to the transfer")]
    MissingSink,

    #[error("Part {0} upload has no upload id")]
    MissingUploadId(u32),

    #[error("Invalid byte range {start}-{end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error(transparent)]
    MetaRequest(#[from] MetaRequestError),

    #[error("Meta-request was cancelled before completion")]
    Cancelled,
}

impl TransferError {
    /// Stable identifier for the failure
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::MissingBody => "missing_body",
            TransferError::IndeterminateLength => "indeterminate_length",
            TransferError::MissingSink => "missing_sink",
            TransferError::MissingUploadId(_) => "missing_upload_id",
            TransferError::InvalidRange { .. } => "invalid_range",
            TransferError::Signing(e) => e.code(),
            TransferError::MetaRequest(e) => e.code(),
            TransferError::Cancelled => "cancelled",
        }
    }
}

/// Caller-visible status of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// No meta-request issued yet
    Pending,
    /// A meta-request is active and in the given phase
    InProgress(MetaRequestState),
    Completed,
    Failed(TransferError),
}

impl TransferStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Failed(_))
    }

    pub fn error_code(&self) -> Option<&'static str> {
        match self {
            TransferStatus::Failed(e) => Some(e.code()),
            _ => None,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Pending => f.write_str("pending"),
            TransferStatus::InProgress(state) => write!(f, "in_progress({})", state),
            TransferStatus::Completed => f.write_str("completed"),
            TransferStatus::Failed(e) => write!(f, "failed({})", e.code()),
        }
    }
}

/// Part of a multipart object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartSpec {
    /// 1-based part number
    pub part_number: u32,
    /// Upload id of the multipart upload (required for PUT)
    pub upload_id: Option<String>,
}

/// Inclusive byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Bytes covered; 0 for an inverted range
    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    /// `Range` header value
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

#[derive(Debug, Default)]
struct Timing {
    started: Option<Instant>,
    finished: Option<Instant>,
}

/// One logical object operation, shared by the caller, transport, and client.
///
/// The completion path is the only writer of terminal status. At most one
/// meta-request is active at a time; each new one gets a fresh attempt number
/// and completions carrying a stale attempt are ignored.
pub struct TransferState {
    id: u64,
    part: Option<PartSpec>,
    range: Option<ByteRange>,
    key: Mutex<Option<String>>,
    body: Mutex<Option<InputStream>>,
    sink: Mutex<Option<OutputSink>>,
    bytes_transferred: AtomicU64,
    attempt: AtomicU64,
    active: AtomicBool,
    timing: Mutex<Timing>,
    status: watch::Sender<TransferStatus>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TransferState {
    pub fn new() -> Self {
        let (status, _) = watch::channel(TransferStatus::Pending);
        Self {
            id: NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed),
            part: None,
            range: None,
            key: Mutex::new(None),
            body: Mutex::new(None),
            sink: Mutex::new(None),
            bytes_transferred: AtomicU64::new(0),
            attempt: AtomicU64::new(0),
            active: AtomicBool::new(false),
            timing: Mutex::new(Timing::default()),
            status,
        }
    }

    /// Transfer for an upload of `body`
    pub fn upload(body: InputStream) -> Self {
        Self::new().with_body(body)
    }

    /// Transfer for a download into `sink`
    pub fn download(sink: OutputSink) -> Self {
        Self::new().with_sink(sink)
    }

    pub fn with_body(self, body: InputStream) -> Self {
        *lock(&self.body) = Some(body);
        self
    }

    pub fn with_sink(self, sink: OutputSink) -> Self {
        *lock(&self.sink) = Some(sink);
        self
    }

    pub fn with_part(mut self, part: PartSpec) -> Self {
        self.part = Some(part);
        self
    }

    pub fn with_range(mut self, range: ByteRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Attach a body for the next upload attempt
    pub fn set_body(&self, body: InputStream) {
        *lock(&self.body) = Some(body);
    }

    /// Attach a sink for the next download attempt
    pub fn set_sink(&self, sink: OutputSink) {
        *lock(&self.sink) = Some(sink);
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Object key of the most recent operation
    pub fn key(&self) -> Option<String> {
        lock(&self.key).clone()
    }

    pub fn part(&self) -> Option<&PartSpec> {
        self.part.as_ref()
    }

    pub fn range(&self) -> Option<ByteRange> {
        self.range
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Number of meta-requests issued for this transfer
    pub fn attempt(&self) -> u64 {
        self.attempt.load(Ordering::Acquire)
    }

    /// Whether a meta-request is currently active
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn status(&self) -> TransferStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TransferStatus> {
        self.status.subscribe()
    }

    /// Wait for the current attempt to reach a terminal status.
    ///
    /// Never resolves for a transfer that has no meta-request issued.
    pub async fn wait(&self) -> TransferStatus {
        let mut rx = self.status.subscribe();
        let result = match rx.wait_for(TransferStatus::is_terminal).await {
            Ok(status) => status.clone(),
            Err(_) => self.status(),
        };
        result
    }

    /// Wall time of the last attempt; running time while it is still active
    pub fn elapsed(&self) -> Option<Duration> {
        let timing = lock(&self.timing);
        let started = timing.started?;
        Some(
            timing
                .finished
                .map(|finished| finished.duration_since(started))
                .unwrap_or_else(|| started.elapsed()),
        )
    }

    /// Mark a new meta-request active; returns its attempt number
    pub(crate) fn begin(&self, key: &str) -> Option<u64> {
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let attempt = self.attempt.fetch_add(1, Ordering::AcqRel) + 1;
        *lock(&self.key) = Some(key.to_string());
        self.bytes_transferred.store(0, Ordering::Relaxed);
        *lock(&self.timing) = Timing {
            started: Some(Instant::now()),
            finished: None,
        };
        self.status
            .send_replace(TransferStatus::InProgress(MetaRequestState::Built));
        Some(attempt)
    }

    pub(crate) fn take_body(&self) -> Option<InputStream> {
        lock(&self.body).take()
    }

    pub(crate) fn take_sink(&self) -> Option<OutputSink> {
        lock(&self.sink).take()
    }

    pub(crate) fn record_progress(&self, bytes: u64) {
        self.bytes_transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Move the active attempt to a non-terminal phase
    pub(crate) fn set_phase(&self, attempt: u64, state: MetaRequestState) {
        if state.is_terminal() {
            return;
        }
        self.status.send_if_modified(|status| {
            if self.attempt.load(Ordering::Acquire) != attempt || status.is_terminal() {
                return false;
            }
            *status = TransferStatus::InProgress(state);
            true
        });
    }

    /// Record the terminal outcome of `attempt`.
    ///
    /// Returns false when the attempt is stale or already terminal.
    pub(crate) fn complete(&self, attempt: u64, result: Result<(), TransferError>) -> bool {
        // The transfer is released before receivers are woken, so a caller
        // observing the terminal status can begin the next attempt
        self.status.send_if_modified(|status| {
            if self.attempt.load(Ordering::Acquire) != attempt || status.is_terminal() {
                return false;
            }
            *status = match &result {
                Ok(()) => TransferStatus::Completed,
                Err(e) => TransferStatus::Failed(e.clone()),
            };
            lock(&self.timing).finished = Some(Instant::now());
            self.active.store(false, Ordering::Release);
            true
        })
    }
}

impl Default for TransferState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferState")
            .field("id", &self.id)
            .field("key", &self.key())
            .field("part", &self.part)
            .field("range", &self.range)
            .field("bytes_transferred", &self.bytes_transferred())
            .field("attempt", &self.attempt())
            .field("status", &self.status())
            .finish()
    }
}
