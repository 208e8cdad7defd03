//! Credential material and providers

use super::signing::SigningError;
use futures::future::{self, BoxFuture};
use std::fmt;

/// AWS access key pair with an optional session token
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Both halves of the key pair are present
    pub fn is_complete(&self) -> bool {
        !self.access_key_id.trim().is_empty() && !self.secret_access_key.trim().is_empty()
    }
}

// Keep secrets out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

/// Source of credentials for a signer.
///
/// Providers may need network calls (STS, instance metadata), so lookup is async.
pub trait ProvideCredentials: Send + Sync {
    fn provide_credentials(&self) -> BoxFuture<'static, Result<Credentials, SigningError>>;

    /// Whether the provider can ever yield credentials
    fn is_valid(&self) -> bool {
        true
    }
}

/// Fixed credentials supplied at construction
#[derive(Debug, Clone)]
pub struct StaticCredentialsProvider {
    credentials: Credentials,
}

impl StaticCredentialsProvider {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl ProvideCredentials for StaticCredentialsProvider {
    fn provide_credentials(&self) -> BoxFuture<'static, Result<Credentials, SigningError>> {
        let result = if self.credentials.is_complete() {
            Ok(self.credentials.clone())
        } else {
            Err(SigningError::InvalidCredentials(
                "access key or secret key is empty".to_string(),
            ))
        };
        Box::pin(future::ready(result))
    }

    fn is_valid(&self) -> bool {
        self.credentials.is_complete()
    }
}

/// Reads `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY` / `AWS_SESSION_TOKEN`
/// on every lookup, so rotated credentials are picked up.
#[derive(Debug, Clone, Default)]
pub struct EnvironmentCredentialsProvider;

impl EnvironmentCredentialsProvider {
    pub fn new() -> Self {
        Self
    }

    fn load() -> Result<Credentials, SigningError> {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            SigningError::CredentialsUnavailable("AWS_ACCESS_KEY_ID is not set".to_string())
        })?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            SigningError::CredentialsUnavailable("AWS_SECRET_ACCESS_KEY is not set".to_string())
        })?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty());

        let credentials = Credentials::new(access_key, secret_key, session_token);
        if !credentials.is_complete() {
            return Err(SigningError::InvalidCredentials(
                "environment credentials are empty".to_string(),
            ));
        }
        Ok(credentials)
    }
}

impl ProvideCredentials for EnvironmentCredentialsProvider {
    fn provide_credentials(&self) -> BoxFuture<'static, Result<Credentials, SigningError>> {
        Box::pin(future::ready(Self::load()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticCredentialsProvider::new(Credentials::new("AKID", "secret", None));
        assert!(provider.is_valid());
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKID");
    }

    #[tokio::test]
    async fn test_static_provider_rejects_empty_keys() {
        let provider = StaticCredentialsProvider::new(Credentials::new("AKID", "  ", None));
        assert!(!provider.is_valid());
        let err = provider.provide_credentials().await.unwrap_err();
        assert!(matches!(err, SigningError::InvalidCredentials(_)));
    }

    // Only test in this binary that touches the AWS_* variables
    #[tokio::test]
    async fn test_environment_provider() {
        let saved: Vec<(&str, Option<String>)> =
            ["AWS_ACCESS_KEY_ID", "AWS_SECRET_ACCESS_KEY", "AWS_SESSION_TOKEN"]
                .into_iter()
                .map(|name| (name, std::env::var(name).ok()))
                .collect();

        std::env::remove_var("AWS_ACCESS_KEY_ID");
        std::env::remove_var("AWS_SECRET_ACCESS_KEY");
        let provider = EnvironmentCredentialsProvider::new();
        let err = provider.provide_credentials().await.unwrap_err();
        assert!(matches!(err, SigningError::CredentialsUnavailable(_)));

        std::env::set_var("AWS_ACCESS_KEY_ID", "AKIDENV");
        std::env::set_var("AWS_SECRET_ACCESS_KEY", "env-secret");
        std::env::set_var("AWS_SESSION_TOKEN", "");
        let creds = provider.provide_credentials().await.unwrap();
        assert_eq!(creds.access_key_id, "AKIDENV");
        assert!(creds.session_token.is_none());

        for (name, value) in saved {
            match value {
                Some(value) => std::env::set_var(name, value),
                None => std::env::remove_var(name),
            }
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("AKID", "super-secret", Some("token".to_string()));
        let printed = format!("{:?}", creds);
        assert!(printed.contains("AKID"));
        assert!(!printed.contains("super-secret"));
        assert!(!printed.contains("token\""));
    }
}
