//! Inspection and cleanup of mirrors already on disk
//!
//! Walks are iterative and never follow symlinks. Removal of a whole mirror is
//! only allowed for paths that resolve strictly inside the configured data
//! directory.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::mirror::is_partial_name;

/// Summary of a local mirror
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStatus {
    pub path: PathBuf,
    pub exists: bool,
    pub directories: u64,
    pub files: u64,
    pub total_bytes: u64,
    /// Leftover `.{name}.part` files from interrupted transfers
    pub partial_files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("{path} is not inside the data directory {data_root}")]
    OutsideDataRoot { path: PathBuf, data_root: PathBuf },

    #[error("{0} does not exist")]
    NotFound(PathBuf),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> CleanupError + '_ {
    move |source| CleanupError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Counts files, bytes and leftover partial transfers under `path`.
pub async fn inspect(path: &Path) -> Result<MirrorStatus, CleanupError> {
    let mut status = MirrorStatus {
        path: path.to_path_buf(),
        ..MirrorStatus::default()
    };

    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => status.exists = true,
        Ok(_) => {
            status.exists = true;
            status.files = 1;
            status.total_bytes = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
            return Ok(status);
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(status),
        Err(e) => return Err(io_err(path)(e)),
    }

    let mut pending = vec![path.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(io_err(&dir))?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err(&dir))? {
            let entry_path = entry.path();
            let file_type = entry.file_type().await.map_err(io_err(&entry_path))?;
            if file_type.is_dir() {
                status.directories += 1;
                pending.push(entry_path);
            } else if file_type.is_file() {
                if is_partial_name(&entry.file_name().to_string_lossy()) {
                    status.partial_files.push(entry_path);
                    continue;
                }
                let meta = entry.metadata().await.map_err(io_err(&entry_path))?;
                status.files += 1;
                status.total_bytes += meta.len();
            }
        }
    }

    status.partial_files.sort();
    Ok(status)
}

/// Removes the mirror at `target` if it lies strictly inside `data_root`.
///
/// Returns what was removed.
pub async fn cleanup(data_root: &Path, target: &Path) -> Result<MirrorStatus, CleanupError> {
    let root = match tokio::fs::canonicalize(data_root).await {
        Ok(root) => root,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CleanupError::OutsideDataRoot {
                path: target.to_path_buf(),
                data_root: data_root.to_path_buf(),
            })
        }
        Err(e) => return Err(io_err(data_root)(e)),
    };
    let resolved = match tokio::fs::canonicalize(target).await {
        Ok(resolved) => resolved,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(CleanupError::NotFound(target.to_path_buf()))
        }
        Err(e) => return Err(io_err(target)(e)),
    };

    if resolved == root || !resolved.starts_with(&root) {
        return Err(CleanupError::OutsideDataRoot {
            path: resolved,
            data_root: root,
        });
    }

    let removed = inspect(&resolved).await?;
    let meta = tokio::fs::symlink_metadata(&resolved)
        .await
        .map_err(io_err(&resolved))?;
    if meta.is_dir() {
        tokio::fs::remove_dir_all(&resolved)
            .await
            .map_err(io_err(&resolved))?;
    } else {
        tokio::fs::remove_file(&resolved)
            .await
            .map_err(io_err(&resolved))?;
    }

    info!(
        path = %resolved.display(),
        files = removed.files,
        bytes = removed.total_bytes,
        "Mirror removed"
    );
    Ok(removed)
}

/// Deletes leftover partial transfers under `path`, returning what was removed.
pub async fn purge_partials(path: &Path) -> Result<Vec<PathBuf>, CleanupError> {
    let status = inspect(path).await?;
    if !status.exists {
        return Err(CleanupError::NotFound(path.to_path_buf()));
    }

    let mut removed = Vec::with_capacity(status.partial_files.len());
    for partial in status.partial_files {
        match tokio::fs::remove_file(&partial).await {
            Ok(()) => removed.push(partial),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = %partial.display(), error = %e, "Cannot remove partial file");
                return Err(io_err(&partial)(e));
            }
        }
    }
    info!(count = removed.len(), "Removed partial transfers");
    Ok(removed)
}
