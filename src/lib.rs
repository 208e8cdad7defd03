//! s3transport - Signed S3 object transport with DNS warm-up and pooled dispatch

pub mod auth;
pub mod client;
pub mod config;
pub mod core;
pub mod endpoint;
pub mod request;
pub mod transfer;
pub mod transport;

pub use config::Config;
pub use core::Core;
pub use transport::{S3ObjectTransport, TransportError, TransportOptions};
