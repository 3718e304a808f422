//! Google Drive v3 HTTP client
//!
//! Wraps `reqwest::Client` with base URL construction, bearer authentication,
//! proactive rate limiting and the mapping of HTTP failures onto
//! [`ProviderError`].
//!
//! ## Status classification
//!
//! | Response | Error |
//! |----------|-------|
//! | 401 | `Unauthorized` |
//! | 403 `rateLimitExceeded` / `userRateLimitExceeded` | `RateLimited` |
//! | 403 `exportSizeLimitExceeded` / `cannotExportFile` | `UnsupportedExport` |
//! | other 403 | `PermissionDenied` |
//! | 404 | `NotFound` |
//! | 408 | `Timeout` |
//! | 429 | `RateLimited` (honours `Retry-After`) |
//! | 5xx | `ServerError` |
//! | other 4xx | `BadRequest` |
//!
//! The client never retries by itself; the engine's retry policy owns that.
//!
//! ## Timeouts
//!
//! Transfers only get an idle timeout between body chunks, so a slow but
//! live download is never cut off. Listing and metadata calls additionally
//! carry a whole-request deadline via [`DriveClient::with_deadline`].

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use drivemirror_core::{config::Config, domain::ProviderError};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::rate_limit::{parse_retry_after, AdaptiveRateLimiter, EndpointCategory, RateLimitConfig};

/// Base URL for the Drive v3 REST API
const DRIVE_BASE_URL: &str = "https://www.googleapis.com/drive/v3";

/// Drive error reasons that signal quota pressure rather than a permission problem
const RATE_LIMIT_REASONS: &[&str] = &["rateLimitExceeded", "userRateLimitExceeded"];

/// Drive error reasons returned when a document cannot be exported
const EXPORT_REASONS: &[&str] = &["exportSizeLimitExceeded", "cannotExportFile"];

// ============================================================================
// Error envelope
// ============================================================================

/// `{"error": {"code": 403, "message": "...", "errors": [{"reason": "..."}]}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for Drive v3 calls
///
/// Cheap to clone; the connection pool and the rate limiter are shared.
#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    base_url: String,
    rate_limiter: Option<Arc<AdaptiveRateLimiter>>,
    shared_drive_id: Option<String>,
    request_timeout: Option<Duration>,
}

impl Default for DriveClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DriveClient {
    /// Creates a client with default HTTP settings and no rate limiter
    pub fn new() -> Self {
        Self::with_base_url(DRIVE_BASE_URL)
    }

    /// Creates a client with a custom base URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: None,
            shared_drive_id: None,
            request_timeout: None,
        }
    }

    /// Builds a client from configuration: timeouts, rate limits and the
    /// optional shared drive scope.
    pub fn from_config(config: &Config) -> Result<Self> {
        let request_timeout = Duration::from_secs(config.network.request_timeout_secs);
        let client = Client::builder()
            .read_timeout(request_timeout)
            .connect_timeout(Duration::from_secs(config.network.connect_timeout_secs))
            .user_agent(concat!("drivemirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        let limiter = AdaptiveRateLimiter::new(RateLimitConfig::from_settings(
            &config.rate_limiting,
        ));

        Ok(Self {
            client,
            base_url: DRIVE_BASE_URL.to_string(),
            rate_limiter: Some(Arc::new(limiter)),
            shared_drive_id: config.drive.shared_drive_id.clone(),
            request_timeout: Some(request_timeout),
        })
    }

    /// Points the client at another API root, keeping every other setting
    pub fn rebase(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the whole-request deadline used by listing and metadata calls
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Attaches an adaptive rate limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<AdaptiveRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Scopes listings to a single shared drive
    pub fn with_shared_drive(mut self, drive_id: impl Into<String>) -> Self {
        self.shared_drive_id = Some(drive_id.into());
        self
    }

    pub fn rate_limiter(&self) -> Option<&Arc<AdaptiveRateLimiter>> {
        self.rate_limiter.as_ref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn shared_drive_id(&self) -> Option<&str> {
        self.shared_drive_id.as_deref()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout
    }

    /// Bounds a short request by the configured deadline.
    ///
    /// Never applied to downloads or exports: their duration scales with the
    /// file size.
    pub fn with_deadline(&self, request: RequestBuilder) -> RequestBuilder {
        match self.request_timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    /// Creates an authenticated request builder for `path` relative to the base URL
    pub fn request(&self, method: Method, path: &str, access_token: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client.request(method, &url).bearer_auth(access_token)
    }

    /// Sends a request under the rate limiter for `category` and classifies
    /// any non-success status.
    pub async fn execute(
        &self,
        request: RequestBuilder,
        category: EndpointCategory,
    ) -> Result<Response, ProviderError> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire(category).await;
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if status.is_success() {
            if let Some(limiter) = &self.rate_limiter {
                limiter.on_success(category);
            }
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        let body = response.text().await.unwrap_or_default();
        let error = classify_status(status, retry_after, &body);

        if matches!(error, ProviderError::RateLimited { .. }) {
            if let Some(limiter) = &self.rate_limiter {
                limiter.on_throttle(category);
            }
            warn!(
                endpoint = category.as_str(),
                status = status.as_u16(),
                retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
                "Provider throttled request"
            );
        } else {
            debug!(
                endpoint = category.as_str(),
                status = status.as_u16(),
                error = %error,
                "Request failed"
            );
        }

        Err(error)
    }
}

/// Maps a transport-level failure onto the provider taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(err.to_string())
    } else if err.is_decode() {
        ProviderError::InvalidResponse(err.to_string())
    } else {
        ProviderError::Network(err.to_string())
    }
}

/// Maps an HTTP error status (and Drive's error envelope) onto [`ProviderError`].
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
) -> ProviderError {
    let envelope = serde_json::from_str::<ErrorEnvelope>(body).ok();
    let message = envelope
        .as_ref()
        .map(|e| e.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_string()
        });
    let has_reason = |reasons: &[&str]| {
        envelope.as_ref().is_some_and(|e| {
            e.error
                .errors
                .iter()
                .any(|d| reasons.contains(&d.reason.as_str()))
        })
    };

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized(message),
        StatusCode::FORBIDDEN if has_reason(RATE_LIMIT_REASONS) => {
            ProviderError::RateLimited { retry_after }
        }
        StatusCode::FORBIDDEN if has_reason(EXPORT_REASONS) => {
            ProviderError::UnsupportedExport(message)
        }
        StatusCode::FORBIDDEN => ProviderError::PermissionDenied(message),
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::REQUEST_TIMEOUT => ProviderError::Timeout(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited { retry_after },
        s if s.is_server_error() => ProviderError::ServerError {
            status: s.as_u16(),
            message,
        },
        _ => ProviderError::BadRequest(format!("{}: {}", status.as_u16(), message)),
    }
}
