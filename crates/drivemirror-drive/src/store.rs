//! JSON file credential store
//!
//! The record is replaced atomically: it is written to a temporary file in
//! the same directory, flushed, and renamed over the target. A crash leaves
//! either the old record or the new one, never a truncated file. On Unix the
//! file is created with mode `0600`.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use drivemirror_core::domain::Credential;
use drivemirror_core::ports::ICredentialStore;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Credential store backed by a single JSON file
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "credentials.json".to_string());
        self.path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
    }
}

#[async_trait::async_trait]
impl ICredentialStore for FileCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No stored credential");
                return Ok(None);
            }
            Err(e) => {
                return Err(anyhow::Error::new(e).context(format!(
                    "Failed to read credential file {}",
                    self.path.display()
                )))
            }
        };

        let credential: Credential = serde_json::from_str(&content)
            .with_context(|| format!("Malformed credential file {}", self.path.display()))?;
        credential
            .validate()
            .with_context(|| format!("Invalid credential file {}", self.path.display()))?;

        debug!(path = %self.path.display(), "Loaded stored credential");
        Ok(Some(credential))
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }

        let json =
            serde_json::to_vec_pretty(credential).context("Failed to serialize credential")?;
        let temp = self.temp_path();

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let write = async {
            let mut file = options.open(&temp).await?;
            file.write_all(&json).await?;
            file.sync_all().await?;
            tokio::fs::rename(&temp, &self.path).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(anyhow::Error::new(e).context(format!(
                "Failed to write credential file {}",
                self.path.display()
            )));
        }

        debug!(path = %self.path.display(), "Saved credential");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "Removed stored credential");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context(format!(
                "Failed to remove credential file {}",
                self.path.display()
            ))),
        }
    }
}
