//! DriveMirror Core - Domain types and ports for remote tree mirroring
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `RemoteNode`, `Credential`, `SyncTask`, `ItemResult`, `SyncReport`
//! - **Export table** - `ExportMapping` from workspace document types to downloadable formats
//! - **Error taxonomy** - `AuthError`, `ProviderError`, `LocalIoError`
//! - **Port definitions** - Traits for adapters: `IRemoteTree`, `ICredentialStore`, `ITokenRefresher`
//! - **Configuration** - YAML-backed `Config` with validation and a builder
//!
//! # Architecture
//!
//! The domain module has no knowledge of HTTP or of the local filesystem layout.
//! Ports define the trait interfaces that adapter crates implement, and the
//! sync engine drives the domain through those ports.

pub mod config;
pub mod domain;
pub mod ports;
