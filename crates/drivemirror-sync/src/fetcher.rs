//! Streamed, atomic retrieval of a single remote object
//!
//! ## Transfer protocol
//!
//! 1. Open a raw download (regular files) or an export in the mapped format
//!    (workspace documents)
//! 2. Stream chunks into `.{name}.part` next to the destination
//! 3. Check the byte count against the announced size, then `fsync`
//! 4. Rename onto the destination
//!
//! The temporary file is removed on every failure path, including a dropped
//! future, so nothing half-written is ever visible at the destination.
//! Transient provider errors restart the transfer from scratch under the
//! retry policy; local I/O errors and permanent provider errors do not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::domain::{
    AuthError, ExportFormat, ItemResult, LocalIoError, NodeKind, ProviderError, RemoteNode,
    SkipReason,
};
use drivemirror_core::ports::IRemoteTree;
use futures_util::StreamExt;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::credentials::CredentialManager;
use crate::mirror::partial_path;
use crate::retry::{Classify, RetryPolicy};

/// Bytes written so far and the announced size, when known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferProgress {
    pub bytes_written: u64,
    pub total_bytes: Option<u64>,
}

/// Receives progress updates; called from worker tasks
pub type ProgressSink = Arc<dyn Fn(&RemoteNode, TransferProgress) + Send + Sync>;

#[derive(Debug, Error)]
enum TransferError {
    #[error(transparent)]
    Provider(ProviderError),
    #[error(transparent)]
    Local(LocalIoError),
    #[error(transparent)]
    Auth(AuthError),
}

impl From<ProviderError> for TransferError {
    fn from(err: ProviderError) -> Self {
        match err.as_auth_error() {
            Some(auth) => TransferError::Auth(auth),
            None => TransferError::Provider(err),
        }
    }
}

impl Classify for TransferError {
    fn is_transient(&self) -> bool {
        matches!(self, TransferError::Provider(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            TransferError::Provider(e) => e.retry_after(),
            TransferError::Local(_) | TransferError::Auth(_) => None,
        }
    }
}

/// Removes the temporary file unless the transfer completed
struct PartialFile {
    path: PathBuf,
    armed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Downloads or exports one node to a local path
#[derive(Clone)]
pub struct ObjectFetcher {
    tree: Arc<dyn IRemoteTree>,
    credentials: Arc<CredentialManager>,
    retry: RetryPolicy,
    progress: Option<ProgressSink>,
}

impl ObjectFetcher {
    pub fn new(
        tree: Arc<dyn IRemoteTree>,
        credentials: Arc<CredentialManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tree,
            credentials,
            retry,
            progress: None,
        }
    }

    /// Installs a progress callback.
    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.progress = Some(sink);
        self
    }

    /// Materializes `node` at `destination`.
    ///
    /// Every outcome except an authentication failure is reported as an
    /// [`ItemResult`]; an `AuthError` is returned so the caller can abort.
    #[instrument(skip_all, fields(node = %node.id, name = %node.name))]
    pub async fn fetch(
        &self,
        node: &RemoteNode,
        destination: &Path,
    ) -> Result<ItemResult, AuthError> {
        let format = match node.kind {
            NodeKind::Folder => {
                return Ok(ItemResult::failed(
                    node,
                    destination,
                    "folders are mirrored as directories, not fetched",
                ))
            }
            NodeKind::WorkspaceDocument => match node.export_format() {
                Some(format) => Some(format),
                None => {
                    debug!(mime_type = %node.native_mime_type, "No export mapping, skipping");
                    return Ok(self.unsupported(node, destination));
                }
            },
            NodeKind::RegularFile => None,
        };

        let high_water = AtomicU64::new(0);
        let result = self
            .retry
            .run("fetch", || {
                self.transfer_once(node, destination, format.as_ref(), &high_water)
            })
            .await;

        match result {
            Ok(bytes) => {
                info!(bytes, path = %destination.display(), "Fetched");
                Ok(ItemResult::success(node, destination, bytes))
            }
            Err(TransferError::Auth(e)) => Err(e),
            Err(TransferError::Provider(ProviderError::UnsupportedExport(message))) => {
                warn!(reason = %message, "Provider refused export, skipping");
                Ok(self.unsupported(node, destination))
            }
            Err(e) => {
                warn!(error = %e, "Fetch failed");
                Ok(ItemResult::failed(node, destination, e.to_string()))
            }
        }
    }

    fn unsupported(&self, node: &RemoteNode, destination: &Path) -> ItemResult {
        ItemResult::skipped(
            node,
            destination,
            SkipReason::UnsupportedType {
                mime_type: node.native_mime_type.clone(),
            },
        )
    }

    async fn transfer_once(
        &self,
        node: &RemoteNode,
        destination: &Path,
        format: Option<&ExportFormat>,
        high_water: &AtomicU64,
    ) -> Result<u64, TransferError> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(TransferError::Auth)?;

        let download = match format {
            Some(format) => self.tree.export(&token, node, format).await?,
            None => self.tree.download(&token, node).await?,
        };
        let total_bytes = download.total_bytes;
        let mut stream = download.stream;

        let partial = partial_path(destination);
        let guard = PartialFile::new(partial.clone());
        let local = |path: &Path, e: std::io::Error| TransferError::Local(LocalIoError::from_io(path, &e));

        let mut file = tokio::fs::File::create(&partial)
            .await
            .map_err(|e| local(&partial, e))?;

        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|e| local(&partial, e))?;
            written += chunk.len() as u64;
            self.report(node, written, total_bytes, high_water);
        }

        if let Some(expected) = total_bytes {
            if written != expected {
                return Err(TransferError::Provider(ProviderError::Network(format!(
                    "transfer ended after {} of {} bytes",
                    written, expected
                ))));
            }
        }

        file.flush().await.map_err(|e| local(&partial, e))?;
        file.sync_all().await.map_err(|e| local(&partial, e))?;
        drop(file);

        tokio::fs::rename(&partial, destination)
            .await
            .map_err(|e| local(destination, e))?;
        guard.disarm();

        Ok(written)
    }

    /// Forwards progress only when it exceeds what was already reported, so
    /// a restarted transfer never moves the counter backwards.
    fn report(
        &self,
        node: &RemoteNode,
        written: u64,
        total_bytes: Option<u64>,
        high_water: &AtomicU64,
    ) {
        let Some(sink) = &self.progress else {
            return;
        };
        if high_water.fetch_max(written, Ordering::Relaxed) < written {
            sink(
                node,
                TransferProgress {
                    bytes_written: written,
                    total_bytes,
                },
            );
        }
    }
}
