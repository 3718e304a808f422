//! Cleanup command - Remove a mirror or its leftover partial files
//!
//! Whole mirrors can only be removed from inside `sync.data_dir`.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use drivemirror_sync::status::{cleanup, purge_partials};
use tracing::info;

use super::CommandContext;

#[derive(Debug, Args)]
pub struct CleanupCommand {
    /// Mirror directory (or file) to remove
    pub path: PathBuf,

    /// Only delete partial files left by interrupted transfers
    #[arg(long)]
    pub partials: bool,
}

impl CleanupCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();

        if self.partials {
            let removed = purge_partials(&self.path).await?;
            if ctx.is_json() {
                fmt.print_json(&serde_json::json!({
                    "success": true,
                    "removed": removed,
                }));
            } else if removed.is_empty() {
                fmt.success("No partial files found");
            } else {
                fmt.success(&format!("Removed {} partial file(s)", removed.len()));
                for path in &removed {
                    fmt.info(&format!("  {}", path.display()));
                }
            }
            return Ok(());
        }

        info!(path = %self.path.display(), "Removing mirror");
        let removed = cleanup(&ctx.config.sync.data_dir, &self.path).await?;

        if ctx.is_json() {
            fmt.print_json(&serde_json::json!({
                "success": true,
                "removed": removed,
            }));
        } else {
            fmt.success(&format!("Removed {}", removed.path.display()));
            fmt.info(&format!(
                "{} file(s), {} director{}, {} bytes",
                removed.files,
                removed.directories,
                if removed.directories == 1 { "y" } else { "ies" },
                removed.total_bytes
            ));
        }
        Ok(())
    }
}
