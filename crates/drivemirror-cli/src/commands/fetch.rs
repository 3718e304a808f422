//! Fetch command - Download or export a single remote object

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use drivemirror_core::domain::{NodeKind, Outcome, RemoteId, RemoteNode};
use drivemirror_sync::LocalMirrorBuilder;
use tracing::info;

use super::CommandContext;
use crate::output::describe_item;

#[derive(Debug, Args)]
pub struct FetchCommand {
    /// Id of the remote file or document
    pub id: String,

    /// Destination file or directory (defaults to the current directory)
    pub destination: Option<PathBuf>,
}

impl FetchCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let id = RemoteId::new(self.id.clone()).context("Invalid object id")?;

        let sync = ctx.orchestrator(None, None)?;
        sync.credentials().ensure_valid().await?;

        let node = sync
            .walker()
            .get_node(&id)
            .await
            .with_context(|| format!("Failed to look up {}", id))?;
        if node.kind == NodeKind::Folder {
            anyhow::bail!("{} is a folder; use 'drivemirror sync {}'", node.name, id);
        }

        let destination = destination_for(self.destination.as_deref(), &node);
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        info!(node = %id, destination = %destination.display(), "Fetching object");
        let item = sync.fetcher().fetch(&node, &destination).await?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::to_value(&item)?);
        }
        match item.outcome {
            Outcome::Success => {
                fmt.success(&format!("Fetched {}", describe_item(&item)));
                Ok(())
            }
            Outcome::Skipped(_) => {
                fmt.warn(&describe_item(&item));
                Ok(())
            }
            Outcome::Failed => anyhow::bail!("{}", describe_item(&item)),
        }
    }
}

/// An existing directory (or no argument) receives the node under its
/// resolved local name; anything else is taken as the file path.
fn destination_for(requested: Option<&Path>, node: &RemoteNode) -> PathBuf {
    match requested {
        Some(path) if !path.is_dir() => path.to_path_buf(),
        Some(dir) => LocalMirrorBuilder::new().resolve_path(dir, node),
        None => LocalMirrorBuilder::new().resolve_path(Path::new("."), node),
    }
}
