//! Meta-request execution
//!
//! This module provides:
//! - [`MetaRequest`] and its lifecycle states
//! - [`MetaRequestClient`]: the pooled connection client interface
//! - [`HyperMetaRequestClient`]: hyper implementation with per-endpoint pools,
//!   retries, and a minimum throughput floor

pub mod hyper_client;
pub mod meta_request;
pub mod throughput;

pub use hyper_client::{ClientConfig, ClientError, ClientStats, HyperMetaRequestClient, Scheme};
pub use meta_request::{
    MetaRequest, MetaRequestClient, MetaRequestContext, MetaRequestError, MetaRequestFuture,
    MetaRequestResult, MetaRequestState, MetaRequestType,
};
pub use throughput::ThroughputMonitor;
