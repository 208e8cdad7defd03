//! Signing configuration and the request signer interface
//!
//! A [`SigningConfig`] is a closed set of signing variants. Signers match on it
//! exhaustively and reject variants or algorithms they cannot produce.

use crate::request::HttpRequest;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Discriminator for the [`SigningConfig`] variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningConfigType {
    /// Region/credential-scope based AWS signing
    Aws,
}

impl fmt::Display for SigningConfigType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningConfigType::Aws => f.write_str("aws"),
        }
    }
}

/// Signature algorithm requested by an AWS signing config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigningAlgorithm {
    /// AWS4-HMAC-SHA256
    SigV4,
    /// AWS4-ECDSA-P256-SHA256 (multi-region)
    SigV4Asymmetric,
}

impl fmt::Display for SigningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningAlgorithm::SigV4 => f.write_str("AWS4-HMAC-SHA256"),
            SigningAlgorithm::SigV4Asymmetric => f.write_str("AWS4-ECDSA-P256-SHA256"),
        }
    }
}

/// Value placed in `x-amz-content-sha256` and used as the payload hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignedBodyValue {
    /// SHA256 of an empty payload
    Empty,
    /// `UNSIGNED-PAYLOAD`, used for streamed bodies
    UnsignedPayload,
    /// Caller supplied hex-encoded SHA256 of the payload
    Precomputed(String),
}

/// AWS signing parameters: credential scope, region, and service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsSigningConfig {
    pub algorithm: SigningAlgorithm,
    pub region: String,
    pub service: String,
    pub signed_body: SignedBodyValue,
    /// Fixed signing time. `None` signs with the current time.
    pub timestamp: Option<DateTime<Utc>>,
    /// Attach the session token after signing instead of signing it
    pub omit_session_token: bool,
}

impl AwsSigningConfig {
    /// SigV4 config for the `s3` service in `region`
    pub fn s3(region: impl Into<String>) -> Self {
        Self {
            algorithm: SigningAlgorithm::SigV4,
            region: region.into(),
            service: "s3".to_string(),
            signed_body: SignedBodyValue::Empty,
            timestamp: None,
            omit_session_token: false,
        }
    }

    pub fn with_signed_body(mut self, signed_body: SignedBodyValue) -> Self {
        self.signed_body = signed_body;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_algorithm(mut self, algorithm: SigningAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }
}

/// Immutable description of how to sign a request.
///
/// Shared read-only (`Arc<SigningConfig>`) across concurrently signed requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningConfig {
    Aws(AwsSigningConfig),
}

impl SigningConfig {
    pub fn config_type(&self) -> SigningConfigType {
        match self {
            SigningConfig::Aws(_) => SigningConfigType::Aws,
        }
    }
}

impl From<AwsSigningConfig> for SigningConfig {
    fn from(config: AwsSigningConfig) -> Self {
        SigningConfig::Aws(config)
    }
}

/// Signing failures, delivered through the signing future
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Credentials unavailable: {0}")]
    CredentialsUnavailable(String),

    #[error("Unsupported signing config: {0}")]
    UnsupportedConfig(String),

    #[error("Canonicalization failed: {0}")]
    Canonicalization(String),
}

impl SigningError {
    /// Stable identifier for the failure
    pub fn code(&self) -> &'static str {
        match self {
            SigningError::InvalidCredentials(_) => "signing_invalid_credentials",
            SigningError::CredentialsUnavailable(_) => "signing_credentials_unavailable",
            SigningError::UnsupportedConfig(_) => "signing_unsupported_config",
            SigningError::Canonicalization(_) => "signing_canonicalization_failed",
        }
    }
}

/// Future returned by [`HttpRequestSigner::sign_request`].
///
/// Resolves exactly once, with the signed request or the reason signing failed.
pub type SigningFuture = BoxFuture<'static, Result<HttpRequest, SigningError>>;

/// Request signer.
///
/// `sign_request` returns immediately; credential lookups and the signature
/// computation happen when the returned future is polled.
pub trait HttpRequestSigner: Send + Sync {
    fn sign_request(&self, request: HttpRequest, config: Arc<SigningConfig>) -> SigningFuture;

    /// Whether this signer holds usable credential material.
    ///
    /// Fixed for the lifetime of the instance.
    fn is_valid(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_s3_config_defaults() {
        let config = AwsSigningConfig::s3("eu-west-1");
        assert_eq!(config.algorithm, SigningAlgorithm::SigV4);
        assert_eq!(config.service, "s3");
        assert_eq!(config.signed_body, SignedBodyValue::Empty);
        assert!(config.timestamp.is_none());

        let config: SigningConfig = config.into();
        assert_eq!(config.config_type(), SigningConfigType::Aws);
    }

    #[test]
    fn test_error_codes_are_distinct() {
        let errors = [
            SigningError::InvalidCredentials(String::new()),
            SigningError::CredentialsUnavailable(String::new()),
            SigningError::UnsupportedConfig(String::new()),
            SigningError::Canonicalization(String::new()),
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
