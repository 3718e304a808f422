//! Credential loading, refresh-on-expiry and single-flight refresh

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::domain::{AuthError, SyncTask};
use drivemirror_core::ports::{RefreshError, RefreshedToken};
use drivemirror_sync::SyncError;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::common::*;

#[tokio::test]
async fn test_valid_credential_is_not_refreshed() {
    let refresher = FakeRefresher::new();
    let credentials = manager(MemoryStore::with(valid_credential()), refresher.clone());

    let credential = credentials.ensure_valid().await.unwrap();
    assert_eq!(credential.access_token, "initial-token");
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn test_expiring_credential_is_refreshed_and_persisted() {
    let store = MemoryStore::with(credential(60, Some("1//refresh")));
    let refresher = FakeRefresher::new();
    let credentials = manager(store.clone(), refresher.clone());

    let credential = credentials.ensure_valid().await.unwrap();
    assert_eq!(credential.access_token, "fresh-token-1");
    assert_eq!(credential.refresh_token.as_deref(), Some("1//refresh"));
    assert!(credential.expiry > chrono::Utc::now() + chrono::Duration::minutes(30));

    let stored = store.current().unwrap();
    assert_eq!(stored.access_token, "fresh-token-1");
    assert_eq!(refresher.calls(), 1);

    // Next call takes the fast path
    assert_eq!(credentials.access_token().await.unwrap(), "fresh-token-1");
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let refresher = FakeRefresher::slow(Duration::from_millis(50));
    let credentials = manager(MemoryStore::with(expired_credential()), refresher.clone());

    let mut handles = Vec::new();
    for _ in 0..10 {
        let credentials = credentials.clone();
        handles.push(tokio::spawn(async move { credentials.access_token().await }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "fresh-token-1");
    }
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_rejected_refresh_is_not_retried_by_waiters() {
    let refresher = FakeRefresher::scripted(vec![Err(RefreshError::Rejected(
        "invalid_grant: Token has been expired or revoked.".into(),
    ))]);
    let credentials = manager(MemoryStore::with(expired_credential()), refresher.clone());

    let mut handles = Vec::new();
    for _ in 0..5 {
        let credentials = credentials.clone();
        handles.push(tokio::spawn(async move { credentials.ensure_valid().await }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, AuthError::RefreshFailed(ref m) if m.contains("invalid_grant")));
    }
    assert_eq!(refresher.calls(), 1);

    // A new login clears the remembered failure
    credentials.replace(valid_credential()).await.unwrap();
    assert!(credentials.ensure_valid().await.is_ok());
    assert_eq!(refresher.calls(), 1);
}

#[tokio::test]
async fn test_transient_refresh_failures_are_retried() {
    let refresher = FakeRefresher::scripted(vec![
        Err(RefreshError::Transient("503 Service Unavailable".into())),
        Ok(RefreshedToken {
            access_token: "after-retry".into(),
            expires_in: Some(Duration::from_secs(3599)),
            refresh_token: Some("1//rotated".into()),
        }),
    ]);
    let store = MemoryStore::with(expired_credential());
    let credentials = manager(store.clone(), refresher.clone());

    let credential = credentials.ensure_valid().await.unwrap();
    assert_eq!(credential.access_token, "after-retry");
    assert_eq!(credential.refresh_token.as_deref(), Some("1//rotated"));
    assert_eq!(refresher.calls(), 2);
    assert_eq!(store.current().unwrap().refresh_token.as_deref(), Some("1//rotated"));
}

#[tokio::test]
async fn test_refresh_gives_up_after_bounded_attempts() {
    let refresher = FakeRefresher::scripted(vec![
        Err(RefreshError::Transient("timeout".into())),
        Err(RefreshError::Transient("timeout".into())),
        Err(RefreshError::Transient("timeout".into())),
        Err(RefreshError::Transient("timeout".into())),
    ]);
    let credentials = manager(MemoryStore::with(expired_credential()), refresher.clone());

    let err = credentials.ensure_valid().await.unwrap_err();
    assert!(matches!(err, AuthError::RefreshFailed(_)));
    assert_eq!(refresher.calls(), 3);
}

#[tokio::test]
async fn test_missing_credential_is_not_authenticated() {
    let credentials = manager(MemoryStore::empty(), FakeRefresher::new());
    let err = credentials.ensure_valid().await.unwrap_err();
    assert!(matches!(err, AuthError::NotAuthenticated(ref m) if m.contains("auth login")));
}

#[tokio::test]
async fn test_expired_without_refresh_token() {
    let refresher = FakeRefresher::new();
    let credentials = manager(MemoryStore::with(credential(-60, None)), refresher.clone());

    let err = credentials.ensure_valid().await.unwrap_err();
    assert!(matches!(err, AuthError::Expired(_)));
    assert_eq!(refresher.calls(), 0);
}

#[tokio::test]
async fn test_near_expiry_without_refresh_token_is_used_until_expiry() {
    let credentials = manager(MemoryStore::with(credential(120, Some(" "))), FakeRefresher::new());
    let credential = credentials.ensure_valid().await.unwrap();
    assert_eq!(credential.access_token, "initial-token");
}

#[tokio::test]
async fn test_persist_failure_keeps_refreshed_token() {
    let store = MemoryStore::read_only(expired_credential());
    let credentials = manager(store.clone(), FakeRefresher::new());

    assert_eq!(credentials.access_token().await.unwrap(), "fresh-token-1");
    assert_eq!(store.current().unwrap().access_token, "initial-token");
}

#[tokio::test]
async fn test_status_and_clear() {
    let store = MemoryStore::with(expired_credential());
    let credentials = manager(store.clone(), FakeRefresher::new());

    let status = credentials.status().await.unwrap();
    assert!(status.present);
    assert!(status.expired);
    assert!(status.needs_refresh);
    assert!(status.refreshable);
    assert_eq!(status.scopes, vec!["https://www.googleapis.com/auth/drive.readonly"]);

    credentials.clear().await.unwrap();
    assert!(store.current().is_none());
    assert!(!credentials.status().await.unwrap().present);
}

#[tokio::test]
async fn test_run_without_credential_returns_no_report() {
    let dest = TempDir::new().unwrap();
    let target = dest.path().join("mirror");
    let tree = FakeTree::new();
    let credentials = manager(MemoryStore::empty(), FakeRefresher::new());

    let err = orchestrator_with(tree.clone(), credentials, 2)
        .run(SyncTask::new(id("root"), &target), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::Auth(AuthError::NotAuthenticated(_))));
    assert!(err.partial_report().is_none());
    assert_eq!(tree.list_calls(), 0);
    assert!(!target.exists());
}

#[tokio::test]
async fn test_run_refreshes_before_traversal() {
    let dest = TempDir::new().unwrap();
    let tree = FakeTree::new();
    tree.folder("root", vec![file("f", "f.txt", "root", 1)]);
    tree.content("f", b"f");
    let refresher = FakeRefresher::new();
    let credentials: Arc<_> = manager(MemoryStore::with(expired_credential()), refresher.clone());

    let report = orchestrator_with(tree.clone(), credentials, 2)
        .run(SyncTask::new(id("root"), dest.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    assert_eq!(refresher.calls(), 1);
    assert!(tree
        .tokens
        .lock()
        .unwrap()
        .iter()
        .all(|t| t == "fresh-token-1"));
}
