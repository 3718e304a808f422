//! Status command - Summarize a local mirror
//!
//! Provides the `drivemirror status` CLI command which reports directory and
//! file counts, total size, and partial files left by interrupted transfers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use drivemirror_sync::status::inspect;
use tracing::info;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Mirror to inspect (defaults to sync.data_dir)
    pub path: Option<PathBuf>,
}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let path = self
            .path
            .clone()
            .unwrap_or_else(|| ctx.config.sync.data_dir.clone());

        info!(path = %path.display(), "Inspecting mirror");
        let status = inspect(&path)
            .await
            .with_context(|| format!("Failed to inspect {}", path.display()))?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::to_value(&status)?);
            return Ok(());
        }

        if !status.exists {
            fmt.warn(&format!("{} does not exist", path.display()));
            return Ok(());
        }

        fmt.success(&format!("Mirror at {}", path.display()));
        fmt.info(&format!("Directories: {}", status.directories));
        fmt.info(&format!("Files:       {}", status.files));
        fmt.info(&format!(
            "Size:        {:.1} MB",
            status.total_bytes as f64 / 1_048_576.0
        ));

        if !status.partial_files.is_empty() {
            fmt.info("");
            fmt.warn(&format!(
                "{} partial file{} from interrupted transfers:",
                status.partial_files.len(),
                if status.partial_files.len() == 1 { "" } else { "s" }
            ));
            for partial in &status.partial_files {
                fmt.info(&format!("  {}", partial.display()));
            }
            fmt.info("Run 'drivemirror cleanup --partials <path>' to remove them.");
        }
        Ok(())
    }
}
