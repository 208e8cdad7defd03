//! Request signing
//!
//! This module provides:
//! - [`SigningConfig`]: closed set of signing configurations, shared read-only
//! - [`HttpRequestSigner`]: async signer interface with single-fire completion
//! - [`Sigv4Signer`]: AWS Signature Version 4 implementation
//! - Credential providers (static and environment)

pub mod credentials;
pub mod signing;
pub mod sigv4;

pub use credentials::{
    Credentials, EnvironmentCredentialsProvider, ProvideCredentials, StaticCredentialsProvider,
};
pub use signing::{
    AwsSigningConfig, HttpRequestSigner, SignedBodyValue, SigningAlgorithm, SigningConfig,
    SigningConfigType, SigningError, SigningFuture,
};
pub use sigv4::Sigv4Signer;
