//! CLI command implementations

pub mod auth;
pub mod cleanup;
pub mod completions;
pub mod config;
pub mod fetch;
pub mod status;
pub mod sync;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use drivemirror_core::config::Config;
use drivemirror_core::ports::IRemoteTree;
use drivemirror_drive::{
    auth::OAuth2TokenRefresher, DriveClient, DriveRemoteTree, FileCredentialStore,
};
use drivemirror_sync::{
    CredentialManager, ObjectFetcher, ProgressSink, RemoteTreeWalker, RetryPolicy, SyncOptions,
    SyncOrchestrator,
};

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Settings shared by every subcommand
pub struct CommandContext {
    pub config: Config,
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CommandContext {
    pub fn new(config: Config, config_path: PathBuf, format: OutputFormat) -> Self {
        Self {
            config,
            config_path,
            format,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn formatter(&self) -> Box<dyn OutputFormatter> {
        get_formatter(self.is_json())
    }

    /// Credential manager over the configured credentials file.
    pub fn credentials(&self) -> Result<Arc<CredentialManager>> {
        let store = Arc::new(FileCredentialStore::new(
            self.config.auth.credentials_path.clone(),
        ));
        let refresher = Arc::new(
            OAuth2TokenRefresher::from_config(&self.config.network)
                .context("Failed to build token refresher")?,
        );
        Ok(Arc::new(CredentialManager::from_config(
            store,
            refresher,
            &self.config,
        )))
    }

    /// Orchestrator wired to Google Drive with `concurrency` workers.
    pub fn orchestrator(
        &self,
        concurrency: Option<usize>,
        progress: Option<ProgressSink>,
    ) -> Result<SyncOrchestrator> {
        let client = DriveClient::from_config(&self.config)?;
        let tree: Arc<dyn IRemoteTree> = Arc::new(DriveRemoteTree::new(client));
        let credentials = self.credentials()?;
        let retry = RetryPolicy::from_config(&self.config.retry);

        let mut options = SyncOptions::from_config(&self.config);
        if let Some(n) = concurrency {
            options = options.with_concurrency(n);
        }

        let walker = RemoteTreeWalker::new(tree.clone(), credentials.clone(), retry.clone());
        let mut fetcher = ObjectFetcher::new(tree, credentials.clone(), retry);
        if let Some(sink) = progress {
            fetcher = fetcher.with_progress(sink);
        }

        Ok(SyncOrchestrator::new(credentials, walker, fetcher, options))
    }
}
