//! Domain entities and business rules
//!
//! This module contains the core domain types for DriveMirror:
//! - Newtypes for validated remote identifiers and page cursors
//! - Remote node classification and the export table
//! - The OAuth2 credential record
//! - Per-run records: sync task, item results, and the aggregate report
//! - The error taxonomy shared by every layer

pub mod credential;
pub mod errors;
pub mod newtypes;
pub mod node;
pub mod report;

// Re-export commonly used types
pub use credential::Credential;
pub use errors::{AuthError, DomainError, LocalIoError, ProviderError};
pub use newtypes::{PageToken, RemoteId};
pub use node::{DocumentType, ExportFormat, ExportMapping, NodeKind, RemoteNode, FOLDER_MIME_TYPE};
pub use report::{ItemResult, Outcome, SkipReason, SyncReport, SyncTask};
