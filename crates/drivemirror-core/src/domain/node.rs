//! Remote nodes and the export table
//!
//! A [`RemoteNode`] is produced per listing page and discarded once processed.
//! Its [`NodeKind`] decides how the sync engine treats it:
//!
//! | Kind | Handling |
//! |------|----------|
//! | `Folder` | descended into, mirrored as a directory |
//! | `RegularFile` | raw streamed download |
//! | `WorkspaceDocument` | exported via [`ExportMapping`], skipped when unmapped |

use serde::{Deserialize, Serialize};

use super::newtypes::RemoteId;

/// MIME type the provider uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Prefix shared by every provider-native editable format
const WORKSPACE_MIME_PREFIX: &str = "application/vnd.google-apps.";

// ============================================================================
// NodeKind
// ============================================================================

/// How a remote node is materialized locally
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Container of other nodes
    Folder,
    /// Downloadable as raw bytes
    RegularFile,
    /// Provider-native document that must be exported
    WorkspaceDocument,
}

impl NodeKind {
    /// Classifies a node from its native MIME type.
    pub fn classify(mime_type: &str) -> Self {
        if mime_type == FOLDER_MIME_TYPE {
            NodeKind::Folder
        } else if mime_type.starts_with(WORKSPACE_MIME_PREFIX) {
            NodeKind::WorkspaceDocument
        } else {
            NodeKind::RegularFile
        }
    }
}

// ============================================================================
// DocumentType + ExportMapping
// ============================================================================

/// Subtypes of workspace documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    Document,
    Spreadsheet,
    Presentation,
    Drawing,
    AppsScript,
    Form,
    Site,
    Map,
    Shortcut,
    Jamboard,
    Unknown,
}

impl DocumentType {
    /// Parses the subtype from a native MIME type.
    pub fn from_mime(mime_type: &str) -> Self {
        match mime_type.strip_prefix(WORKSPACE_MIME_PREFIX) {
            Some("document") => DocumentType::Document,
            Some("spreadsheet") => DocumentType::Spreadsheet,
            Some("presentation") => DocumentType::Presentation,
            Some("drawing") => DocumentType::Drawing,
            Some("script") => DocumentType::AppsScript,
            Some("form") => DocumentType::Form,
            Some("site") => DocumentType::Site,
            Some("map") => DocumentType::Map,
            Some("shortcut") => DocumentType::Shortcut,
            Some("jam") => DocumentType::Jamboard,
            _ => DocumentType::Unknown,
        }
    }
}

/// Target format of an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// MIME type requested from the export endpoint
    pub mime_type: &'static str,
    /// Extension appended to the local file name (without the dot)
    pub extension: &'static str,
}

const PDF: ExportFormat = ExportFormat {
    mime_type: "application/pdf",
    extension: "pdf",
};

const XLSX: ExportFormat = ExportFormat {
    mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    extension: "xlsx",
};

const PNG: ExportFormat = ExportFormat {
    mime_type: "image/png",
    extension: "png",
};

const SCRIPT_JSON: ExportFormat = ExportFormat {
    mime_type: "application/vnd.google-apps.script+json",
    extension: "json",
};

/// Static table from workspace document subtype to export format
pub struct ExportMapping;

impl ExportMapping {
    /// Returns the export format for a document subtype, or `None` when the
    /// provider offers no downloadable representation we support.
    pub fn lookup(document_type: DocumentType) -> Option<ExportFormat> {
        match document_type {
            DocumentType::Document => Some(PDF),
            DocumentType::Spreadsheet => Some(XLSX),
            DocumentType::Presentation => Some(PDF),
            DocumentType::Drawing => Some(PNG),
            DocumentType::AppsScript => Some(SCRIPT_JSON),
            DocumentType::Form
            | DocumentType::Site
            | DocumentType::Map
            | DocumentType::Shortcut
            | DocumentType::Jamboard
            | DocumentType::Unknown => None,
        }
    }

    /// Convenience lookup keyed by native MIME type.
    pub fn for_mime(mime_type: &str) -> Option<ExportFormat> {
        Self::lookup(DocumentType::from_mime(mime_type))
    }
}

// ============================================================================
// RemoteNode
// ============================================================================

/// One object in the remote tree, as returned by a listing page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteNode {
    pub id: RemoteId,
    pub name: String,
    pub kind: NodeKind,
    pub native_mime_type: String,
    pub parent_ids: Vec<RemoteId>,
    /// Byte size, when the provider reports one (never for workspace documents)
    pub size: Option<u64>,
}

impl RemoteNode {
    /// Builds a node, deriving its kind from the MIME type.
    pub fn new(
        id: RemoteId,
        name: impl Into<String>,
        native_mime_type: impl Into<String>,
        parent_ids: Vec<RemoteId>,
        size: Option<u64>,
    ) -> Self {
        let native_mime_type = native_mime_type.into();
        Self {
            id,
            name: name.into(),
            kind: NodeKind::classify(&native_mime_type),
            native_mime_type,
            parent_ids,
            size,
        }
    }

    /// First listed parent.
    pub fn parent_id(&self) -> Option<&RemoteId> {
        self.parent_ids.first()
    }

    /// Export format for workspace documents, `None` for anything else.
    pub fn export_format(&self) -> Option<ExportFormat> {
        match self.kind {
            NodeKind::WorkspaceDocument => ExportMapping::for_mime(&self.native_mime_type),
            NodeKind::Folder | NodeKind::RegularFile => None,
        }
    }
}
