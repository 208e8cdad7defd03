use crate::transfer::TransferError;
use std::io;
use thiserror::Error;

/// Failures returned synchronously by the transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid bucket name: {0}")]
    InvalidBucket(String),

    #[error("max_connections must be greater than zero")]
    ZeroConnections,

    #[error("Signer has no usable credentials")]
    InvalidSigner,

    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("No endpoints resolved for {0}")]
    NoEndpoints(String),

    #[error("Transfer {0} already has an active meta-request")]
    TransferBusy(u64),

    #[error(transparent)]
    Request(#[from] TransferError),
}

impl TransportError {
    /// Stable identifier for the failure
    pub fn code(&self) -> &'static str {
        match self {
            TransportError::InvalidBucket(_) => "invalid_bucket",
            TransportError::ZeroConnections => "zero_connections",
            TransportError::InvalidSigner => "invalid_signer",
            TransportError::InvalidContentType(_) => "invalid_content_type",
            TransportError::Resolve { .. } => "resolve_failed",
            TransportError::NoEndpoints(_) => "no_endpoints",
            TransportError::TransferBusy(_) => "transfer_busy",
            TransportError::Request(e) => e.code(),
        }
    }
}
