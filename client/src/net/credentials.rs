//! Bearer credential sources.
//!
//! A provider is asked for a token on every REST call and every channel
//! connect attempt, so a provider that refreshes (or re-reads) its token is
//! picked up on the next reconnect without rebuilding the view.

#[cfg(test)]
#[path = "credentials_test.rs"]
mod credentials_test;

use async_trait::async_trait;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No token is configured.
    #[error("no credential available: {0}")]
    Missing(String),

    /// The provider could not produce a token.
    #[error("credential provider failed: {0}")]
    Provider(String),
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when no usable token can be produced.
    async fn token(&self) -> Result<String, CredentialError>;
}

/// A fixed token.
#[derive(Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

impl std::fmt::Debug for StaticCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticCredential").field("token", &"<redacted>").finish()
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        if self.token.trim().is_empty() {
            return Err(CredentialError::Missing("empty token".to_owned()));
        }
        Ok(self.token.clone())
    }
}

/// Reads the token from an environment variable on every call.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    #[must_use]
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredential {
    async fn token(&self) -> Result<String, CredentialError> {
        match std::env::var(&self.var) {
            Ok(token) if !token.trim().is_empty() => Ok(token.trim().to_owned()),
            Ok(_) => Err(CredentialError::Missing(format!("{} is empty", self.var))),
            Err(std::env::VarError::NotPresent) => Err(CredentialError::Missing(format!("{} is not set", self.var))),
            Err(e) => Err(CredentialError::Provider(format!("{}: {e}", self.var))),
        }
    }
}
