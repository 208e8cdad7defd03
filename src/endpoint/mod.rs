//! Endpoint resolution and selection
//!
//! # Components
//!
//! - [`Endpoint`]: one resolved address with connection and failure tracking
//! - [`EndpointPool`]: copy-on-write set of endpoints for a host, with
//!   round-robin or least-connections selection and DNS warm-up
//! - [`Resolve`]: lookup interface, implemented by [`SystemResolver`] and
//!   [`StaticResolver`]
//! - [`EndpointMonitor`]: optional hook receiving per-endpoint outcomes
//!
//! # Warm-up
//!
//! `warm(n)` issues up to `min(n, cap)` concurrent lookups of the bucket host
//! and merges the distinct answers after the existing entries. DNS servers
//! that rotate answers spread the pool across more addresses this way.

#[allow(clippy::module_inception)]
pub mod endpoint;
pub mod monitor;
pub mod pool;
pub mod resolver;

pub use endpoint::{Endpoint, EndpointLease, EndpointSnapshot};
pub use monitor::{EndpointMonitor, EndpointOutcome, EndpointStats, EndpointStatsMonitor};
pub use pool::{EndpointPool, Selection, WarmReport};
pub use resolver::{Resolve, StaticResolver, SystemResolver};
