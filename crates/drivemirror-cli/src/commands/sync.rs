//! Sync command - Mirror a Google Drive folder into a local directory
//!
//! Provides the `drivemirror sync` CLI command which:
//! 1. Builds the Drive adapter and credential manager from configuration
//! 2. Resolves the destination (optionally named after the remote folder)
//! 3. Runs the orchestrator until completion or Ctrl-C
//! 4. Prints the report and optionally writes it as JSON

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Args;
use drivemirror_core::domain::{NodeKind, RemoteId, RemoteNode, SyncReport, SyncTask};
use drivemirror_sync::mirror::root_folder_name;
use drivemirror_sync::{ProgressSink, SyncError, SyncOrchestrator, TransferProgress};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::CommandContext;
use crate::output::{print_report, OutputFormatter};

#[derive(Debug, Args)]
pub struct SyncCommand {
    /// Id of the remote folder to mirror
    pub root_id: String,

    /// Local destination (defaults to sync.data_dir)
    pub destination: Option<PathBuf>,

    /// Mirror into a subfolder named after the remote folder
    #[arg(long)]
    pub named: bool,

    /// Append a timestamp to the subfolder name (implies --named)
    #[arg(long)]
    pub timestamp: bool,

    /// Number of concurrent transfers (overrides sync.concurrency)
    #[arg(long, short = 'j')]
    pub concurrency: Option<usize>,

    /// Write the report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl SyncCommand {
    pub async fn execute(&self, ctx: &CommandContext) -> Result<()> {
        let fmt = ctx.formatter();
        let root_id = RemoteId::new(self.root_id.clone()).context("Invalid folder id")?;

        let sync = ctx.orchestrator(self.concurrency, Some(progress_logger()))?;

        let base = self
            .destination
            .clone()
            .unwrap_or_else(|| ctx.config.sync.data_dir.clone());
        let local_root = if self.named || self.timestamp {
            let stamp = self.timestamp || ctx.config.sync.timestamped_folders;
            base.join(named_root(&sync, &root_id, stamp).await?)
        } else {
            base
        };

        info!(
            root = %root_id,
            destination = %local_root.display(),
            concurrency = sync.options().concurrency,
            "Starting mirror"
        );
        fmt.info(&format!("Mirroring {} into {}", root_id, local_root.display()));

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        let signal_task = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing in-flight transfers");
                on_signal.cancel();
            }
        });

        let outcome = sync.run(SyncTask::new(root_id, local_root), cancel).await;
        signal_task.abort();

        match outcome {
            Ok(report) => {
                self.write_report(&report)?;
                self.show(ctx, &*fmt, &report)?;
                if report.failed() > 0 {
                    anyhow::bail!("{} item(s) failed", report.failed());
                }
                Ok(())
            }
            Err(SyncError::Aborted { reason, partial }) => {
                self.write_report(&partial)?;
                self.show(ctx, &*fmt, &partial)?;
                fmt.error(&format!("Run aborted: {}", reason));
                fmt.info("Run 'drivemirror auth login' to sign in again.");
                Err(SyncError::Aborted { reason, partial }.into())
            }
            Err(e) => {
                fmt.error(&e.to_string());
                Err(e.into())
            }
        }
    }

    fn show(&self, ctx: &CommandContext, fmt: &dyn OutputFormatter, report: &SyncReport) -> Result<()> {
        if ctx.is_json() {
            fmt.print_json(&serde_json::to_value(report).context("Failed to serialize report")?);
        } else {
            print_report(fmt, report);
        }
        Ok(())
    }

    fn write_report(&self, report: &SyncReport) -> Result<()> {
        let Some(path) = &self.report else {
            return Ok(());
        };
        write_report_file(path, report)
    }
}

/// Subfolder name for `--named`, taken from the remote folder's metadata.
async fn named_root(sync: &SyncOrchestrator, root_id: &RemoteId, stamp: bool) -> Result<String> {
    let node = sync
        .walker()
        .get_node(root_id)
        .await
        .with_context(|| format!("Failed to look up folder {}", root_id))?;
    if node.kind != NodeKind::Folder {
        anyhow::bail!("{} ({}) is not a folder", node.name, root_id);
    }
    let timestamp = stamp.then(|| Local::now().naive_local());
    Ok(root_folder_name(&node.name, timestamp))
}

fn write_report_file(path: &Path, report: &SyncReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Report written");
    Ok(())
}

fn progress_logger() -> ProgressSink {
    Arc::new(|node: &RemoteNode, progress: TransferProgress| {
        debug!(
            node = %node.id,
            name = %node.name,
            written = progress.bytes_written,
            total = ?progress.total_bytes,
            "Transfer progress"
        );
    })
}
