//! Credential persistence and refresh ports
//!
//! Storage errors use `anyhow::Result` because they are adapter-specific and
//! the credential manager reports them verbatim. Refresh errors are classified
//! so that the manager can retry transient failures and stop on rejections.

use std::time::Duration;

use thiserror::Error;

use crate::domain::credential::Credential;

/// Durable storage for the single credential record
#[async_trait::async_trait]
pub trait ICredentialStore: Send + Sync {
    /// Loads the stored credential, `None` when nothing has been saved yet.
    async fn load(&self) -> anyhow::Result<Option<Credential>>;

    /// Atomically replaces the stored credential.
    async fn save(&self, credential: &Credential) -> anyhow::Result<()>;

    /// Removes the stored credential. Removing nothing is not an error.
    async fn clear(&self) -> anyhow::Result<()>;
}

/// Token endpoint response for a refresh grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub expires_in: Option<Duration>,
    /// Present when the provider rotates refresh tokens
    pub refresh_token: Option<String>,
}

/// Failure of a refresh attempt
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The provider refused the grant (revoked or invalid refresh token)
    #[error("refresh rejected: {0}")]
    Rejected(String),

    /// The endpoint could not be reached or answered with a server error
    #[error("refresh endpoint unavailable: {0}")]
    Transient(String),
}

/// Exchanges a refresh token for a new access token
#[async_trait::async_trait]
pub trait ITokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<RefreshedToken, RefreshError>;
}
