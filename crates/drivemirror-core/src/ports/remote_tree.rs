//! Remote tree port (driven/secondary port)
//!
//! ## Design Notes
//!
//! - Methods return [`ProviderError`] rather than `anyhow::Error` because the
//!   engine's retry policy needs to tell transient failures from permanent ones.
//! - The access token is passed per call. The credential manager may rotate it
//!   in the middle of a run and the adapter never caches it.
//! - Downloads are exposed as byte streams so callers hold at most one chunk.

use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

use crate::domain::errors::ProviderError;
use crate::domain::newtypes::{PageToken, RemoteId};
use crate::domain::node::{ExportFormat, RemoteNode};

/// Body of a download or export, chunk by chunk
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProviderError>> + Send>>;

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    /// Children in the order the provider returned them
    pub nodes: Vec<RemoteNode>,
    /// Cursor for the next page, `None` on the last page
    pub next_page_token: Option<PageToken>,
}

/// An open transfer
pub struct Download {
    /// Size announced by the provider, `None` when unknown (typical for exports)
    pub total_bytes: Option<u64>,
    pub stream: ByteStream,
}

impl std::fmt::Debug for Download {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Download")
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Port trait for read access to a remote object tree
#[async_trait::async_trait]
pub trait IRemoteTree: Send + Sync {
    /// Lists one page of the children of `folder_id`.
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &RemoteId,
        page_token: Option<&PageToken>,
    ) -> Result<ListingPage, ProviderError>;

    /// Fetches the metadata of a single node.
    async fn get_node(&self, access_token: &str, id: &RemoteId)
        -> Result<RemoteNode, ProviderError>;

    /// Opens a raw download of a regular file.
    async fn download(&self, access_token: &str, node: &RemoteNode)
        -> Result<Download, ProviderError>;

    /// Opens an export of a workspace document in `format`.
    async fn export(
        &self,
        access_token: &str,
        node: &RemoteNode,
        format: &ExportFormat,
    ) -> Result<Download, ProviderError>;
}
