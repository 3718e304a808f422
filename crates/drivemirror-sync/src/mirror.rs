//! Local path resolution and directory creation
//!
//! ## Naming rules
//!
//! - Characters that are unsafe on common filesystems (`/ \ : * ? " < > |` and
//!   control characters) become `_`; trailing dots and spaces are trimmed.
//! - Exported documents get the mapped extension unless the name already ends
//!   with it (`Notes` becomes `Notes.pdf`, `Notes.pdf` stays `Notes.pdf`).
//! - Names are compared case-insensitively within a parent directory. The
//!   first sibling to claim a name keeps it; later siblings get their remote
//!   id inserted before the extension: `Report (1AbC).pdf`. If that name is
//!   itself taken, a counter follows the id: `Report (1AbC-2).pdf`.
//! - Names shaped like a transfer file (`.x.part`) get their leading dot
//!   replaced (`_x.part`), so no mirrored file can be mistaken for one.
//!
//! Claims are scoped to one builder. The orchestrator creates a builder per
//! run and resolves paths in listing order, which is stable, so an unchanged
//! tree resolves to the same paths on every run.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::NaiveDateTime;
use drivemirror_core::domain::{LocalIoError, NodeKind, RemoteId, RemoteNode};

/// Longest sanitized name kept before extensions and disambiguation suffixes
const MAX_NAME_BYTES: usize = 160;

/// Suffix of in-progress transfer files
pub const PARTIAL_SUFFIX: &str = ".part";

/// Maps remote nodes onto local paths for one run
#[derive(Debug, Default)]
pub struct LocalMirrorBuilder {
    /// (parent dir, lowercase name) -> node that owns the name
    claims: Mutex<HashMap<(PathBuf, String), RemoteId>>,
}

impl LocalMirrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local path for `node` under `parent`, claiming the name for this run.
    pub fn resolve_path(&self, parent: &Path, node: &RemoteNode) -> PathBuf {
        let extension = node.export_format().map(|f| f.extension);
        let base = local_name(&node.name, extension);

        let mut claims = self.claims.lock().unwrap_or_else(PoisonError::into_inner);
        let key = (parent.to_path_buf(), base.to_lowercase());

        match claims.get(&key) {
            None => {
                claims.insert(key, node.id.clone());
                return parent.join(base);
            }
            Some(owner) if *owner == node.id => return parent.join(base),
            Some(_) => {}
        }

        let split_extension = node.kind != NodeKind::Folder;
        let mut attempt = 1u32;
        loop {
            let tag = match attempt {
                1 => node.id.to_string(),
                n => format!("{}-{}", node.id, n),
            };
            let alternative = disambiguate(&base, &tag, split_extension);
            let key = (parent.to_path_buf(), alternative.to_lowercase());
            match claims.get(&key) {
                Some(owner) if *owner != node.id => attempt += 1,
                _ => {
                    claims.insert(key, node.id.clone());
                    return parent.join(alternative);
                }
            }
        }
    }

    /// Creates `path` and its parents. An existing directory is success, so
    /// concurrent callers asking for the same directory all succeed.
    pub async fn ensure_dir(&self, path: &Path) -> Result<(), LocalIoError> {
        match tokio::fs::create_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && is_dir(path).await => Ok(()),
            Err(e) => Err(LocalIoError::from_io(path, &e)),
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Replaces unsafe characters and bounds the length of a single path component.
pub fn sanitize_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_end_matches(['.', ' ']);
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return "_".to_string();
    }

    truncate_bytes(trimmed, MAX_NAME_BYTES).to_string()
}

/// Name of the mirror root when nesting under the remote folder's own name.
pub fn root_folder_name(name: &str, timestamp: Option<NaiveDateTime>) -> String {
    let base = sanitize_name(name);
    match timestamp {
        Some(ts) => format!("{}_{}", base, ts.format("%Y%m%d_%H%M%S")),
        None => base,
    }
}

/// Temporary sibling a transfer writes to before the final rename.
pub fn partial_path(destination: &Path) -> PathBuf {
    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}{}", file_name, PARTIAL_SUFFIX))
}

/// Whether a file name looks like a leftover transfer.
pub fn is_partial_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(PARTIAL_SUFFIX) && name.len() > PARTIAL_SUFFIX.len() + 1
}

fn local_name(remote_name: &str, extension: Option<&str>) -> String {
    let base = sanitize_name(remote_name);
    let name = match extension {
        Some(ext) if !base.to_lowercase().ends_with(&format!(".{}", ext)) => {
            format!("{}.{}", base, ext)
        }
        _ => base,
    };
    // Partial-shaped names are reserved for transfer files
    if is_partial_name(&name) {
        format!("_{}", &name[1..])
    } else {
        name
    }
}

fn disambiguate(base: &str, tag: &str, split_extension: bool) -> String {
    let split = if split_extension {
        base.rfind('.').filter(|&i| i > 0)
    } else {
        None
    };
    match split {
        Some(i) => format!("{} ({}){}", &base[..i], tag, &base[i..]),
        None => format!("{} ({})", base, tag),
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
