use crate::client::{MetaRequestContext, MetaRequestResult, MetaRequestType};
use crate::transfer::TransferError;
use tokio::task::JoinHandle;
use tracing::debug;

/// Caller-side handle to a submitted meta-request
#[derive(Debug)]
pub struct MetaRequestHandle {
    id: u64,
    kind: MetaRequestType,
    join: JoinHandle<Result<MetaRequestResult, TransferError>>,
}

impl MetaRequestHandle {
    pub(crate) fn new(
        id: u64,
        kind: MetaRequestType,
        join: JoinHandle<Result<MetaRequestResult, TransferError>>,
    ) -> Self {
        Self { id, kind, join }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> MetaRequestType {
        self.kind
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the meta-request to end.
    ///
    /// The transfer's terminal status has been recorded when this returns.
    pub async fn join(self) -> Result<MetaRequestResult, TransferError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                debug!(id = self.id, error = %e, "Meta-request task did not finish");
                Err(TransferError::Cancelled)
            }
        }
    }

    /// Cancel the meta-request; the transfer ends as `Failed(Cancelled)`
    /// unless it already reached a terminal status.
    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Records `Cancelled` when a meta-request task ends without completing its
/// transfer (aborted or panicked).
pub(crate) struct CompletionGuard {
    context: MetaRequestContext,
}

impl CompletionGuard {
    pub(crate) fn new(context: MetaRequestContext) -> Self {
        Self { context }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if self.context.complete(Err(TransferError::Cancelled)) {
            debug!(id = self.context.id(), "Meta-request cancelled");
        }
    }
}
