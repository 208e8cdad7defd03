//! Object transport façade
//!
//! [`S3ObjectTransport`] turns PutObject/GetObject calls on a
//! [`TransferState`](crate::transfer::TransferState) into signed meta-requests:
//!
//! 1. Built: Host, Content-Type, Content-Length (body only), Range
//! 2. Signing: asynchronous, through the configured signer
//! 3. Queued / InFlight: driven by the pooled client
//! 4. Completed / Failed: recorded once on the transfer
//!
//! Build failures (missing body, indeterminate length, missing sink) fail
//! the transfer immediately and are also returned to the caller.

pub mod addressing;
pub mod error;
pub mod handle;
pub mod object_transport;
pub mod options;

pub use error::TransportError;
pub use handle::MetaRequestHandle;
pub use object_transport::S3ObjectTransport;
pub use options::TransportOptions;
