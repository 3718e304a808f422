//! Credential lifecycle: load, refresh-on-expiry, persist
//!
//! [`CredentialManager`] is the only writer of the stored credential. Every
//! provider call obtains its access token through [`CredentialManager::access_token`],
//! which refreshes when the token expires within the safety margin.
//!
//! ## Single-flight refresh
//!
//! The in-memory state sits behind one async mutex that is held across the
//! refresh call. Concurrent callers queue on the mutex; once the first caller
//! has stored the new token they take the fast path and never hit the token
//! endpoint themselves. If the refresh failed, the failure is remembered
//! against the stale access token so queued callers get the same error
//! instead of retrying a refresh token the provider has just rejected.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use drivemirror_core::config::Config;
use drivemirror_core::domain::{AuthError, Credential};
use drivemirror_core::ports::{ICredentialStore, ITokenRefresher, RefreshError};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::retry::RetryPolicy;

const LOGIN_HINT: &str = "run `drivemirror auth login`";

#[derive(Default)]
struct State {
    current: Option<Credential>,
    /// Access token whose refresh failed, with the error every caller gets
    last_failure: Option<(String, AuthError)>,
}

/// Snapshot of the credential for `auth status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub present: bool,
    pub expiry: Option<DateTime<Utc>>,
    pub expired: bool,
    pub needs_refresh: bool,
    pub refreshable: bool,
    pub client_id: Option<String>,
    pub scopes: Vec<String>,
}

/// Owns the OAuth2 credential for the process
pub struct CredentialManager {
    store: Arc<dyn ICredentialStore>,
    refresher: Arc<dyn ITokenRefresher>,
    retry: RetryPolicy,
    safety_margin: chrono::Duration,
    state: Mutex<State>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn ICredentialStore>,
        refresher: Arc<dyn ITokenRefresher>,
        retry: RetryPolicy,
        safety_margin: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            retry,
            safety_margin: chrono::Duration::from_std(safety_margin)
                .unwrap_or_else(|_| chrono::Duration::minutes(5)),
            state: Mutex::new(State::default()),
        }
    }

    pub fn from_config(
        store: Arc<dyn ICredentialStore>,
        refresher: Arc<dyn ITokenRefresher>,
        config: &Config,
    ) -> Self {
        Self::new(
            store,
            refresher,
            RetryPolicy::from_config(&config.retry),
            Duration::from_secs(config.auth.refresh_margin_secs),
        )
    }

    /// Reads the stored credential, replacing anything held in memory.
    pub async fn load(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;
        let credential = self.load_from_store().await?;
        state.current = Some(credential.clone());
        state.last_failure = None;
        Ok(credential)
    }

    /// Returns a credential that stays valid for at least the safety margin,
    /// refreshing it first when needed.
    pub async fn ensure_valid(&self) -> Result<Credential, AuthError> {
        let mut state = self.state.lock().await;

        let current = match &state.current {
            Some(credential) => credential.clone(),
            None => {
                let loaded = self.load_from_store().await?;
                state.current = Some(loaded.clone());
                loaded
            }
        };

        let now = Utc::now();
        if !current.needs_refresh(now, self.safety_margin) {
            return Ok(current);
        }

        if let Some((stale_token, error)) = &state.last_failure {
            if *stale_token == current.access_token {
                debug!("Reusing failure of the previous refresh attempt");
                return Err(error.clone());
            }
        }

        if current.usable_refresh_token().is_none() {
            if current.is_expired(now) {
                return Err(AuthError::Expired(format!(
                    "access token expired at {} and no refresh token is stored; {}",
                    current.expiry, LOGIN_HINT
                )));
            }
            warn!(
                expires_at = %current.expiry,
                "Access token expires soon and cannot be refreshed"
            );
            return Ok(current);
        }

        match self.refresh(&current).await {
            Ok(fresh) => {
                state.current = Some(fresh.clone());
                state.last_failure = None;
                Ok(fresh)
            }
            Err(error) => {
                state.last_failure = Some((current.access_token.clone(), error.clone()));
                Err(error)
            }
        }
    }

    /// Access token of a valid credential.
    pub async fn access_token(&self) -> Result<String, AuthError> {
        self.ensure_valid().await.map(|c| c.access_token)
    }

    /// Persists `credential` and makes it the current one.
    pub async fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        credential.validate().context("Refusing to store an invalid credential")?;
        let mut state = self.state.lock().await;
        self.store.save(credential).await?;
        state.current = Some(credential.clone());
        state.last_failure = None;
        Ok(())
    }

    /// Replaces the credential after a fresh login.
    pub async fn replace(&self, credential: Credential) -> anyhow::Result<()> {
        self.save(&credential).await?;
        info!(expires_at = %credential.expiry, "Stored new credential");
        Ok(())
    }

    /// Forgets the credential in memory and in the store.
    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        self.store.clear().await?;
        *state = State::default();
        Ok(())
    }

    /// Describes the stored credential without refreshing it.
    pub async fn status(&self) -> anyhow::Result<CredentialStatus> {
        let state = self.state.lock().await;
        let credential = match &state.current {
            Some(credential) => Some(credential.clone()),
            None => self.store.load().await?,
        };
        let now = Utc::now();

        Ok(match credential {
            Some(c) => CredentialStatus {
                present: true,
                expiry: Some(c.expiry),
                expired: c.is_expired(now),
                needs_refresh: c.needs_refresh(now, self.safety_margin),
                refreshable: c.usable_refresh_token().is_some(),
                client_id: Some(c.client_id.clone()),
                scopes: c.scopes.iter().cloned().collect(),
            },
            None => CredentialStatus {
                present: false,
                expiry: None,
                expired: false,
                needs_refresh: false,
                refreshable: false,
                client_id: None,
                scopes: Vec::new(),
            },
        })
    }

    async fn load_from_store(&self) -> Result<Credential, AuthError> {
        match self.store.load().await {
            Ok(Some(credential)) => Ok(credential),
            Ok(None) => Err(AuthError::NotAuthenticated(format!(
                "no stored credential; {}",
                LOGIN_HINT
            ))),
            Err(e) => Err(AuthError::NotAuthenticated(format!(
                "cannot read stored credential: {:#}",
                e
            ))),
        }
    }

    #[instrument(name = "token_refresh", skip_all, fields(client_id = %current.client_id))]
    async fn refresh(&self, current: &Credential) -> Result<Credential, AuthError> {
        let refreshed = self
            .retry
            .run("token_refresh", move || self.refresher.refresh(current))
            .await
            .map_err(|e| match e {
                RefreshError::Rejected(message) => AuthError::RefreshFailed(message),
                RefreshError::Transient(message) => AuthError::RefreshFailed(format!(
                    "token endpoint unavailable after {} attempts: {}",
                    self.retry.max_attempts(),
                    message
                )),
            })?;

        let fresh = current.with_refreshed(
            refreshed.access_token,
            refreshed.expires_in,
            refreshed.refresh_token,
            Utc::now(),
        );

        if let Err(e) = self.store.save(&fresh).await {
            warn!(error = %format!("{:#}", e), "Failed to persist refreshed credential");
        }

        info!(expires_at = %fresh.expiry, "Access token refreshed");
        Ok(fresh)
    }
}
