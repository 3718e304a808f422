//! `IRemoteTree` implementation backed by the Drive v3 API
//!
//! Thin adapter: every method delegates to the function of the same name in
//! [`crate::listing`] or [`crate::download`].

use drivemirror_core::domain::{ExportFormat, PageToken, ProviderError, RemoteId, RemoteNode};
use drivemirror_core::ports::{Download, IRemoteTree, ListingPage};

use crate::client::DriveClient;
use crate::{download, listing};

/// Google Drive remote tree
#[derive(Debug, Clone)]
pub struct DriveRemoteTree {
    client: DriveClient,
}

impl DriveRemoteTree {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteTree for DriveRemoteTree {
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &RemoteId,
        page_token: Option<&PageToken>,
    ) -> Result<ListingPage, ProviderError> {
        listing::list_children(&self.client, access_token, folder_id, page_token).await
    }

    async fn get_node(
        &self,
        access_token: &str,
        id: &RemoteId,
    ) -> Result<RemoteNode, ProviderError> {
        listing::get_node(&self.client, access_token, id).await
    }

    async fn download(
        &self,
        access_token: &str,
        node: &RemoteNode,
    ) -> Result<Download, ProviderError> {
        download::download(&self.client, access_token, node).await
    }

    async fn export(
        &self,
        access_token: &str,
        node: &RemoteNode,
        format: &ExportFormat,
    ) -> Result<Download, ProviderError> {
        download::export(&self.client, access_token, node, format).await
    }
}
