//! Transfer state shared between the caller, the transport, and the client

pub mod state;
pub mod stream;

pub use state::{ByteRange, PartSpec, TransferError, TransferState, TransferStatus};
pub use stream::{InputStream, OutputSink};
