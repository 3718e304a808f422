//! Integration tests for folder listing and metadata lookup
//!
//! - Single and multi-page listings
//! - Query parameters (ordering, shared drives)
//! - HTTP status classification into `ProviderError`

use std::time::Duration;

use drivemirror_core::domain::{NodeKind, PageToken, ProviderError, FOLDER_MIME_TYPE};
use drivemirror_core::ports::IRemoteTree;
use drivemirror_drive::{DriveClient, DriveRemoteTree};
use wiremock::matchers::{header, method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_list_children_single_page() {
    let (server, tree) = common::setup_drive_mock().await;

    common::mount_listing(
        &server,
        "root-1",
        serde_json::json!([
            common::drive_file("fold-1", "sub", FOLDER_MIME_TYPE, None),
            common::drive_file("file-1", "a.txt", "text/plain", Some(10)),
            common::drive_file("doc-1", "Notes", "application/vnd.google-apps.document", None),
        ]),
    )
    .await;

    let page = tree
        .list_children(common::TOKEN, &common::id("root-1"), None)
        .await
        .expect("listing failed");

    assert!(page.next_page_token.is_none());
    assert_eq!(page.nodes.len(), 3);
    assert_eq!(page.nodes[0].kind, NodeKind::Folder);
    assert_eq!(page.nodes[1].name, "a.txt");
    assert_eq!(page.nodes[1].size, Some(10));
    assert_eq!(page.nodes[2].kind, NodeKind::WorkspaceDocument);
}

#[tokio::test]
async fn test_list_children_sends_auth_and_ordering() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(query_param("orderBy", "folder,name,createdTime"))
        .and(query_param("supportsAllDrives", "true"))
        .and(query_param("includeItemsFromAllDrives", "true"))
        .and(query_param("pageSize", "1000"))
        .and(query_param_is_missing("corpora"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .expect(1)
        .mount(&server)
        .await;

    let tree = DriveRemoteTree::new(DriveClient::with_base_url(server.uri()));
    let page = tree
        .list_children(common::TOKEN, &common::id("root-1"), None)
        .await
        .unwrap();
    assert!(page.nodes.is_empty());
}

#[tokio::test]
async fn test_list_children_shared_drive_scope() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("corpora", "drive"))
        .and(query_param("driveId", "0AAshared"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = DriveClient::with_base_url(server.uri()).with_shared_drive("0AAshared");
    let tree = DriveRemoteTree::new(client);
    tree.list_children(common::TOKEN, &common::id("0AAshared"), None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_list_children_pagination() {
    let (server, tree) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param_is_missing("pageToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "page-2",
            "files": [common::drive_file("f1", "one.txt", "text/plain", Some(1))]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::drive_file("f2", "two.txt", "text/plain", Some(2))]
        })))
        .mount(&server)
        .await;

    let first = tree
        .list_children(common::TOKEN, &common::id("root-1"), None)
        .await
        .unwrap();
    assert_eq!(first.nodes[0].id.as_str(), "f1");
    let token = first.next_page_token.expect("expected a second page");
    assert_eq!(token, PageToken::new("page-2".into()).unwrap());

    let second = tree
        .list_children(common::TOKEN, &common::id("root-1"), Some(&token))
        .await
        .unwrap();
    assert_eq!(second.nodes[0].id.as_str(), "f2");
    assert!(second.next_page_token.is_none());
}

#[tokio::test]
async fn test_get_node() {
    let (server, tree) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/file-9"))
        .and(query_param("fields", "id,name,mimeType,parents,size"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::drive_file(
            "file-9",
            "report.csv",
            "text/csv",
            Some(42),
        )))
        .mount(&server)
        .await;

    let node = tree
        .get_node(common::TOKEN, &common::id("file-9"))
        .await
        .unwrap();
    assert_eq!(node.name, "report.csv");
    assert_eq!(node.size, Some(42));
    assert_eq!(node.parent_id().unwrap().as_str(), "root-1");
}

#[tokio::test]
async fn test_listing_status_classification() {
    let cases: Vec<(ResponseTemplate, fn(&ProviderError) -> bool)> = vec![
        (
            ResponseTemplate::new(401)
                .set_body_json(common::drive_error(401, "authError", "Invalid Credentials")),
            |e| matches!(e, ProviderError::Unauthorized(_)),
        ),
        (
            ResponseTemplate::new(403).set_body_json(common::drive_error(
                403,
                "rateLimitExceeded",
                "Rate Limit Exceeded",
            )),
            |e| matches!(e, ProviderError::RateLimited { .. }),
        ),
        (
            ResponseTemplate::new(403).set_body_json(common::drive_error(
                403,
                "insufficientFilePermissions",
                "The user does not have sufficient permissions",
            )),
            |e| matches!(e, ProviderError::PermissionDenied(_)),
        ),
        (
            ResponseTemplate::new(404)
                .set_body_json(common::drive_error(404, "notFound", "File not found")),
            |e| matches!(e, ProviderError::NotFound(_)),
        ),
        (
            ResponseTemplate::new(500).set_body_string("backend error"),
            |e| matches!(e, ProviderError::ServerError { status: 500, .. }),
        ),
    ];

    for (template, check) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .respond_with(template)
            .mount(&server)
            .await;

        let tree = DriveRemoteTree::new(DriveClient::with_base_url(server.uri()));
        let err = tree
            .list_children(common::TOKEN, &common::id("root-1"), None)
            .await
            .unwrap_err();
        assert!(check(&err), "unexpected classification: {err:?}");
    }
}

#[tokio::test]
async fn test_429_carries_retry_after() {
    let (server, tree) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(429).append_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = tree
        .list_children(common::TOKEN, &common::id("root-1"), None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        ProviderError::RateLimited {
            retry_after: Some(Duration::from_secs(7))
        }
    );
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let (server, tree) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("not json")
                .append_header("Content-Type", "application/json"),
        )
        .mount(&server)
        .await;

    let err = tree
        .list_children(common::TOKEN, &common::id("root-1"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::InvalidResponse(_)), "{err:?}");
}
