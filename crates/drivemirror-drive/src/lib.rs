//! DriveMirror Drive - Google Drive v3 adapter
//!
//! Provides:
//! - A typed HTTP client with status classification into `ProviderError`
//! - Paginated folder listing and metadata lookup
//! - Streamed raw downloads and document exports
//! - Adaptive per-endpoint rate limiting
//! - OAuth2 login (authorization code with PKCE) and refresh-token exchange
//! - A file-backed credential store with atomic replacement
//!
//! ## Modules
//!
//! - [`auth`] - OAuth2 login flow and the token refresher
//! - [`client`] - Drive v3 HTTP client
//! - [`listing`] - `files.list` / `files.get`
//! - [`download`] - `alt=media` downloads and `files.export`
//! - [`provider`] - `IRemoteTree` implementation
//! - [`rate_limit`] - Token buckets with adaptive capacity
//! - [`store`] - JSON credential store

pub mod auth;
pub mod client;
pub mod download;
pub mod listing;
pub mod provider;
pub mod rate_limit;
pub mod store;

pub use client::DriveClient;
pub use provider::DriveRemoteTree;
pub use store::FileCredentialStore;
