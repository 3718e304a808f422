//! Integration tests for the refresh-token grant

use std::time::Duration;

use drivemirror_core::ports::{ITokenRefresher, RefreshError};
use drivemirror_drive::auth::OAuth2TokenRefresher;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

fn refresher() -> OAuth2TokenRefresher {
    OAuth2TokenRefresher::new(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_refresh_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=1%2F%2Frefresh-token"))
        .and(body_string_contains("client_secret=desktop-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.new",
            "expires_in": 3599,
            "token_type": "Bearer",
            "scope": "https://www.googleapis.com/auth/drive.readonly"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let credential = common::credential(format!("{}/token", server.uri()));
    let refreshed = refresher().refresh(&credential).await.unwrap();

    assert_eq!(refreshed.access_token, "ya29.new");
    assert_eq!(refreshed.expires_in, Some(Duration::from_secs(3599)));
    assert!(refreshed.refresh_token.is_none());
}

#[tokio::test]
async fn test_refresh_rotated_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.new",
            "refresh_token": "1//rotated",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let credential = common::credential(format!("{}/token", server.uri()));
    let refreshed = refresher().refresh(&credential).await.unwrap();
    assert_eq!(refreshed.refresh_token.as_deref(), Some("1//rotated"));
}

#[tokio::test]
async fn test_refresh_invalid_grant_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .mount(&server)
        .await;

    let credential = common::credential(format!("{}/token", server.uri()));
    let err = refresher().refresh(&credential).await.unwrap_err();
    match err {
        RefreshError::Rejected(message) => assert!(message.contains("invalid_grant")),
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refresh_server_outage_is_transient() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>unavailable</html>"))
        .mount(&server)
        .await;

    let credential = common::credential(format!("{}/token", server.uri()));
    let err = refresher().refresh(&credential).await.unwrap_err();
    assert!(matches!(err, RefreshError::Transient(_)), "{err:?}");
}

#[tokio::test]
async fn test_refresh_without_refresh_token_is_rejected() {
    let mut credential = common::credential("http://127.0.0.1:9/token".into());
    credential.refresh_token = Some("   ".into());

    let err = refresher().refresh(&credential).await.unwrap_err();
    assert!(matches!(err, RefreshError::Rejected(_)));
}
