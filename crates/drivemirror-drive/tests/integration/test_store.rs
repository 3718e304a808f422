//! Integration tests for the JSON credential store

use drivemirror_core::ports::ICredentialStore;
use drivemirror_drive::FileCredentialStore;
use tempfile::TempDir;

use crate::common;

#[tokio::test]
async fn test_load_missing_returns_none() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(dir.path().join("credentials.json"));
    assert!(store.load().await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(dir.path().join("nested/credentials.json"));
    let credential = common::credential("https://oauth2.googleapis.com/token".into());

    store.save(&credential).await.unwrap();
    let loaded = store.load().await.unwrap().expect("credential should exist");
    assert_eq!(loaded, credential);

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert!(raw.contains("\"accessToken\""));
    assert!(raw.contains("\"refreshToken\""));
}

#[tokio::test]
async fn test_save_overwrites_without_leftovers() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(dir.path().join("credentials.json"));
    let mut credential = common::credential("https://oauth2.googleapis.com/token".into());

    store.save(&credential).await.unwrap();
    credential.access_token = "ya29.second".into();
    store.save(&credential).await.unwrap();

    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "ya29.second");

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1, "temporary files must not survive a save");
}

#[cfg(unix)]
#[tokio::test]
async fn test_saved_file_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(dir.path().join("credentials.json"));
    store
        .save(&common::credential("https://oauth2.googleapis.com/token".into()))
        .await
        .unwrap();

    let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test]
async fn test_load_google_library_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("token.json");
    std::fs::write(
        &path,
        r#"{
            "token": "ya29.lib",
            "refresh_token": "1//lib",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "s",
            "scopes": ["https://www.googleapis.com/auth/drive.readonly"],
            "expiry": "2026-01-15T10:00:00Z"
        }"#,
    )
    .unwrap();

    let store = FileCredentialStore::new(path);
    let loaded = store.load().await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "ya29.lib");
    assert_eq!(loaded.usable_refresh_token(), Some("1//lib"));
}

#[tokio::test]
async fn test_malformed_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("credentials.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = FileCredentialStore::new(path);
    assert!(store.load().await.is_err());
}

#[tokio::test]
async fn test_clear_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let store = FileCredentialStore::new(dir.path().join("credentials.json"));
    store
        .save(&common::credential("https://oauth2.googleapis.com/token".into()))
        .await
        .unwrap();

    store.clear().await.unwrap();
    assert!(store.load().await.unwrap().is_none());
    store.clear().await.unwrap();
}
