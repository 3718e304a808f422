//! OAuth2 credential record
//!
//! The persisted record is the single source of truth for authentication.
//! It is written in camelCase and also accepts the snake_case layout produced
//! by Google's client libraries (`token`, `refresh_token`, `token_uri`, ...).

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

/// Lifetime assumed when the token endpoint omits `expires_in`
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// OAuth2 token bundle with refresh capability
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(alias = "token", alias = "access_token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(alias = "token_uri")]
    pub token_uri: String,
    #[serde(alias = "client_id")]
    pub client_id: String,
    #[serde(default, alias = "client_secret")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    pub expiry: DateTime<Utc>,
}

impl Credential {
    /// Checks the fields every usable record must carry.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.access_token.trim().is_empty() {
            return Err(DomainError::InvalidCredential(
                "access token is empty".to_string(),
            ));
        }
        if self.token_uri.trim().is_empty() {
            return Err(DomainError::InvalidCredential(
                "token endpoint is empty".to_string(),
            ));
        }
        if self.client_id.trim().is_empty() {
            return Err(DomainError::InvalidCredential(
                "client id is empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether the access token expires within `margin` of `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expiry <= now + margin
    }

    /// Whether the access token is already past its expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }

    /// The refresh token, if present and non-empty.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }

    /// Returns a copy carrying a freshly issued access token.
    ///
    /// Providers that rotate refresh tokens return a new one; otherwise the
    /// current refresh token is kept.
    pub fn with_refreshed(
        &self,
        access_token: String,
        expires_in: Option<std::time::Duration>,
        rotated_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Credential {
        let lifetime = expires_in
            .and_then(|d| Duration::from_std(d).ok())
            .unwrap_or_else(|| Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS));

        Credential {
            access_token,
            refresh_token: rotated_refresh_token.or_else(|| self.refresh_token.clone()),
            expiry: now + lifetime,
            ..self.clone()
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[redacted]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[redacted]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[redacted]"),
            )
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}
