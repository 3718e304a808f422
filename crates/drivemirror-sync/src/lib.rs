//! DriveMirror Sync - mirror synchronization engine
//!
//! Provides:
//! - Credential lifecycle with single-flight refresh
//! - Paginated, cycle-safe traversal of the remote tree
//! - Streamed, atomic object transfers with retry
//! - Deterministic local path resolution
//! - A bounded worker pool that aggregates results into a `SyncReport`
//!
//! ## Modules
//!
//! - [`credentials`] - `CredentialManager`
//! - [`walker`] - `RemoteTreeWalker`
//! - [`fetcher`] - `ObjectFetcher`
//! - [`mirror`] - `LocalMirrorBuilder`
//! - [`orchestrator`] - `SyncOrchestrator`
//! - [`retry`] - Shared retry policy with transient/permanent classification
//! - [`status`] - Inspection and cleanup of existing mirrors

pub mod credentials;
pub mod fetcher;
pub mod mirror;
pub mod orchestrator;
pub mod retry;
pub mod status;
pub mod walker;

use std::path::PathBuf;

use drivemirror_core::domain::{AuthError, LocalIoError, ProviderError, RemoteId, SyncReport};
use thiserror::Error;

pub use credentials::{CredentialManager, CredentialStatus};
pub use fetcher::{ObjectFetcher, ProgressSink, TransferProgress};
pub use mirror::LocalMirrorBuilder;
pub use orchestrator::{SyncOptions, SyncOrchestrator};
pub use retry::RetryPolicy;
pub use status::{CleanupError, MirrorStatus};
pub use walker::{ListingError, RemoteTreeWalker, WalkEvent};

/// Errors that end a synchronization run without a complete report
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credential validation failed before any traversal; no report exists
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The credential became unusable mid-run; `partial` holds what was done
    #[error("run aborted: {reason}")]
    Aborted {
        reason: AuthError,
        partial: Box<SyncReport>,
    },

    /// The remote root could not be looked up
    #[error("cannot read remote root {id}: {source}")]
    Root {
        id: RemoteId,
        #[source]
        source: ProviderError,
    },

    /// The remote root exists but is not a folder
    #[error("remote root {id} ({name}) is not a folder")]
    NotAFolder { id: RemoteId, name: String },

    /// The local destination root could not be created
    #[error("cannot create destination {path}: {source}")]
    Destination {
        path: PathBuf,
        #[source]
        source: LocalIoError,
    },
}

impl SyncError {
    /// The report accumulated before the run stopped, if any.
    pub fn partial_report(&self) -> Option<&SyncReport> {
        match self {
            SyncError::Aborted { partial, .. } => Some(partial),
            SyncError::Auth(_)
            | SyncError::Root { .. }
            | SyncError::NotAFolder { .. }
            | SyncError::Destination { .. } => None,
        }
    }
}
