//! Folder listing and metadata lookup (`files.list`, `files.get`)
//!
//! One call returns one page. The caller follows `next_page_token` until it
//! is `None`; nothing here loops over pages so that the walker can interleave
//! pagination with descent and stop early on cancellation.
//!
//! Listings are ordered `folder,name,createdTime`, which keeps sibling order
//! stable between runs. Name collision resolution relies on that.
//!
//! See: <https://developers.google.com/drive/api/reference/rest/v3/files/list>

use drivemirror_core::domain::{PageToken, ProviderError, RemoteId, RemoteNode};
use drivemirror_core::ports::ListingPage;
use reqwest::Method;
use serde::Deserialize;
use tracing::debug;

use crate::client::{transport_error, DriveClient};
use crate::rate_limit::EndpointCategory;

/// Fields requested per file; everything else is dropped server-side
const FILE_FIELDS: &str = "id,name,mimeType,parents,size";

/// Largest page size the API accepts
const PAGE_SIZE: &str = "1000";

const LIST_ORDER: &str = "folder,name,createdTime";

// ============================================================================
// Drive API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// A `File` resource restricted to [`FILE_FIELDS`]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    parents: Vec<String>,
    /// int64 serialized as a JSON string
    size: Option<String>,
}

impl DriveFile {
    fn into_node(self) -> Result<RemoteNode, ProviderError> {
        let id = RemoteId::new(self.id)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let parents = self
            .parents
            .into_iter()
            .filter_map(|p| RemoteId::new(p).ok())
            .collect();
        let size = self.size.and_then(|s| s.parse::<u64>().ok());

        Ok(RemoteNode::new(id, self.name, self.mime_type, parents, size))
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Lists one page of the non-trashed children of `folder_id`.
pub async fn list_children(
    client: &DriveClient,
    access_token: &str,
    folder_id: &RemoteId,
    page_token: Option<&PageToken>,
) -> Result<ListingPage, ProviderError> {
    let query = format!("'{}' in parents and trashed=false", folder_id);
    let fields = format!("nextPageToken,files({})", FILE_FIELDS);

    let mut params: Vec<(&str, &str)> = vec![
        ("q", query.as_str()),
        ("fields", fields.as_str()),
        ("pageSize", PAGE_SIZE),
        ("orderBy", LIST_ORDER),
        ("supportsAllDrives", "true"),
        ("includeItemsFromAllDrives", "true"),
    ];
    if let Some(drive_id) = client.shared_drive_id() {
        params.push(("corpora", "drive"));
        params.push(("driveId", drive_id));
    }
    if let Some(token) = page_token {
        params.push(("pageToken", token.as_str()));
    }

    let request = client.with_deadline(
        client
            .request(Method::GET, "/files", access_token)
            .query(&params),
    );
    let response = client.execute(request, EndpointCategory::Listing).await?;
    let list: FileList = response.json().await.map_err(transport_error)?;

    let nodes = list
        .files
        .into_iter()
        .map(DriveFile::into_node)
        .collect::<Result<Vec<_>, _>>()?;

    // An empty token is treated as the end of the listing
    let next_page_token = list
        .next_page_token
        .and_then(|token| PageToken::new(token).ok());

    debug!(
        folder_id = %folder_id,
        count = nodes.len(),
        has_more = next_page_token.is_some(),
        "Listed folder page"
    );

    Ok(ListingPage {
        nodes,
        next_page_token,
    })
}

/// Fetches the metadata of a single node.
pub async fn get_node(
    client: &DriveClient,
    access_token: &str,
    id: &RemoteId,
) -> Result<RemoteNode, ProviderError> {
    let path = format!("/files/{}", id);
    let request = client.with_deadline(
        client
            .request(Method::GET, &path, access_token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]),
    );
    let response = client.execute(request, EndpointCategory::Metadata).await?;
    let file: DriveFile = response.json().await.map_err(transport_error)?;
    file.into_node()
}
