//! Port definitions (hexagonal architecture interfaces)
//!
//! The sync engine depends only on these traits. Adapter crates implement
//! them for a concrete provider and a concrete credential storage.
//!
//! ## Ports Overview
//!
//! - [`IRemoteTree`] - Folder listing, metadata lookup, download and export streams
//! - [`ICredentialStore`] - Durable storage of the single credential record
//! - [`ITokenRefresher`] - Exchange of a refresh token for a new access token

pub mod credential_store;
pub mod remote_tree;

pub use credential_store::{ICredentialStore, ITokenRefresher, RefreshError, RefreshedToken};
pub use remote_tree::{ByteStream, Download, IRemoteTree, ListingPage};
