//! Domain error types
//!
//! The taxonomy is split by how far an error is allowed to travel:
//!
//! - [`AuthError`] is fatal. It aborts a whole run because no further provider
//!   call can succeed without a valid credential.
//! - [`ProviderError`] is scoped to the item or folder that triggered it.
//!   Transient variants are retried with backoff before being recorded.
//! - [`LocalIoError`] is scoped to the item whose write failed.
//! - [`DomainError`] covers validation of values entering the domain.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid remote object identifier
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid pagination cursor
    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    /// A credential record is missing required fields
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

// ============================================================================
// AuthError
// ============================================================================

/// Credential failures. Always fatal for the run that observes them.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// No usable credential is available (never logged in, or rejected by the provider)
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// The refresh endpoint rejected the refresh token or stayed unreachable
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// The access token expired and there is no refresh token to renew it
    #[error("Credential expired: {0}")]
    Expired(String),
}

// ============================================================================
// ProviderError
// ============================================================================

/// Errors returned by the remote storage provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider asked us to slow down (HTTP 429 or a rate-limit 403)
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay requested by the provider, when it sent one
        retry_after: Option<Duration>,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// The request did not complete within its deadline
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Connection-level failure (DNS, reset, truncated body)
    #[error("Network error: {0}")]
    Network(String),

    /// The requested object does not exist or is not visible
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller lacks permission on the object
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The provider rejected the access token
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The provider refused to export the document in the requested format
    #[error("Export not supported: {0}")]
    UnsupportedExport(String),

    /// The request was malformed or refused for a non-retryable reason
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The response could not be parsed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::ServerError { .. }
                | ProviderError::Timeout(_)
                | ProviderError::Network(_)
        )
    }

    /// Delay hint supplied by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ProviderError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Converts a rejected access token into the fatal auth error.
    pub fn as_auth_error(&self) -> Option<AuthError> {
        match self {
            ProviderError::Unauthorized(message) => {
                Some(AuthError::NotAuthenticated(message.clone()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// LocalIoError
// ============================================================================

/// Local filesystem failures, classified for the report
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocalIoError {
    /// No space left on the device (or quota exceeded)
    #[error("Disk full while writing {0}")]
    DiskFull(PathBuf),

    /// The process may not write at this location
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The path or one of its components exceeds filesystem limits
    #[error("Path too long: {0}")]
    PathTooLong(PathBuf),

    /// Any other I/O failure
    #[error("I/O error at {path}: {message}")]
    Other { path: PathBuf, message: String },
}

impl LocalIoError {
    /// Classifies an I/O error raised while operating on `path`.
    pub fn from_io(path: &Path, err: &io::Error) -> Self {
        #[cfg(unix)]
        if let Some(code) = err.raw_os_error() {
            match code {
                libc::ENOSPC | libc::EDQUOT => return LocalIoError::DiskFull(path.to_path_buf()),
                libc::ENAMETOOLONG => return LocalIoError::PathTooLong(path.to_path_buf()),
                libc::EACCES | libc::EPERM | libc::EROFS => {
                    return LocalIoError::PermissionDenied(path.to_path_buf())
                }
                _ => {}
            }
        }

        if err.kind() == io::ErrorKind::PermissionDenied {
            return LocalIoError::PermissionDenied(path.to_path_buf());
        }

        LocalIoError::Other {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}
