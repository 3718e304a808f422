//! Streamed transfers: raw downloads (`alt=media`) and document exports
//!
//! Both return a [`Download`] whose body is consumed chunk by chunk. The
//! announced size comes from `Content-Length`; exports are usually chunked
//! and report `None`.

use drivemirror_core::domain::{ExportFormat, ProviderError, RemoteNode};
use drivemirror_core::ports::Download;
use futures_util::TryStreamExt;
use reqwest::{Method, Response};
use tracing::debug;

use crate::client::{transport_error, DriveClient};
use crate::rate_limit::EndpointCategory;

/// Opens a raw download of a regular file.
pub async fn download(
    client: &DriveClient,
    access_token: &str,
    node: &RemoteNode,
) -> Result<Download, ProviderError> {
    let path = format!("/files/{}", node.id);
    let request = client
        .request(Method::GET, &path, access_token)
        .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
    let response = client.execute(request, EndpointCategory::Download).await?;

    debug!(
        node_id = %node.id,
        content_length = response.content_length(),
        "Download opened"
    );

    Ok(into_download(response))
}

/// Opens an export of a workspace document in `format`.
pub async fn export(
    client: &DriveClient,
    access_token: &str,
    node: &RemoteNode,
    format: &ExportFormat,
) -> Result<Download, ProviderError> {
    let path = format!("/files/{}/export", node.id);
    let request = client
        .request(Method::GET, &path, access_token)
        .query(&[("mimeType", format.mime_type)]);
    let response = client.execute(request, EndpointCategory::Export).await?;

    debug!(
        node_id = %node.id,
        export_mime = format.mime_type,
        content_length = response.content_length(),
        "Export opened"
    );

    Ok(into_download(response))
}

fn into_download(response: Response) -> Download {
    let total_bytes = response.content_length();
    let stream = response.bytes_stream().map_err(transport_error);
    Download {
        total_bytes,
        stream: Box::pin(stream),
    }
}
