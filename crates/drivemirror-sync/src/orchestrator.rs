//! Sync orchestrator: one run from credential check to sealed report
//!
//! ## Run sequence
//!
//! 1. `CredentialManager::ensure_valid` (failure ends the run with no report)
//! 2. Look up the remote root; a missing root or a non-folder ends the run
//!    with no report and nothing created locally
//! 3. Create the local root
//! 4. Pull events from the [`Walk`](crate::walker::Walk) and act on them:
//!    directories are created inline, files are fetched by a bounded pool of
//!    workers, folders and cycles are recorded as they close
//! 5. Await in-flight workers and seal the report
//!
//! ## Cancellation
//!
//! Once the token is cancelled no further event is pulled and no further
//! fetch is dispatched. Fetches already running complete normally and their
//! results are part of the returned report, which is flagged as cancelled.
//!
//! ## Authentication failures
//!
//! An `AuthError` from the walker or from any worker stops dispatch, aborts
//! the remaining workers and returns [`SyncError::Aborted`] with everything
//! recorded so far.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use drivemirror_core::config::Config;
use drivemirror_core::domain::{
    AuthError, ItemResult, NodeKind, RemoteId, RemoteNode, SkipReason, SyncReport, SyncTask,
};
use drivemirror_core::ports::IRemoteTree;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::credentials::CredentialManager;
use crate::fetcher::ObjectFetcher;
use crate::mirror::LocalMirrorBuilder;
use crate::retry::RetryPolicy;
use crate::walker::{ListingError, RemoteTreeWalker, WalkEvent};
use crate::SyncError;

const MAX_CONCURRENCY: usize = 32;

/// Tunables of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Number of fetches allowed in flight
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self { concurrency: 4 }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self::default().with_concurrency(config.sync.concurrency)
    }

    /// Sets the worker count, clamped to `1..=32`.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self
    }
}

type WorkerResult = Result<ItemResult, AuthError>;

/// Drives walker, mirror builder and fetcher for one remote root at a time
pub struct SyncOrchestrator {
    credentials: Arc<CredentialManager>,
    walker: RemoteTreeWalker,
    fetcher: ObjectFetcher,
    options: SyncOptions,
}

impl SyncOrchestrator {
    pub fn new(
        credentials: Arc<CredentialManager>,
        walker: RemoteTreeWalker,
        fetcher: ObjectFetcher,
        options: SyncOptions,
    ) -> Self {
        Self {
            credentials,
            walker,
            fetcher,
            options,
        }
    }

    /// Wires a walker and a fetcher over the same tree and retry policy.
    pub fn with_tree(
        tree: Arc<dyn IRemoteTree>,
        credentials: Arc<CredentialManager>,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        let walker = RemoteTreeWalker::new(tree.clone(), credentials.clone(), retry.clone());
        let fetcher = ObjectFetcher::new(tree, credentials.clone(), retry);
        Self::new(credentials, walker, fetcher, options)
    }

    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    pub fn walker(&self) -> &RemoteTreeWalker {
        &self.walker
    }

    pub fn fetcher(&self) -> &ObjectFetcher {
        &self.fetcher
    }

    pub fn options(&self) -> SyncOptions {
        self.options
    }

    /// Mirrors `task.remote_root_id` into `task.local_root`.
    ///
    /// Returns a report for every run that got past credential validation,
    /// except when the credential fails mid-run (see [`SyncError::Aborted`]).
    #[instrument(
        name = "sync_run",
        skip_all,
        fields(run_id = %task.run_id, root = %task.remote_root_id)
    )]
    pub async fn run(
        &self,
        task: SyncTask,
        cancel: CancellationToken,
    ) -> Result<SyncReport, SyncError> {
        self.credentials.ensure_valid().await?;
        let root = self.resolve_root(&task.remote_root_id).await?;

        let mirror = Arc::new(LocalMirrorBuilder::new());
        mirror
            .ensure_dir(&task.local_root)
            .await
            .map_err(|source| SyncError::Destination {
                path: task.local_root.clone(),
                source,
            })?;

        info!(
            local_root = %task.local_root.display(),
            root_name = %root.name,
            concurrency = self.options.concurrency,
            "Starting sync"
        );

        let mut walk = self
            .walker
            .walk(root, task.local_root.clone(), mirror.clone());
        let mut report = SyncReport::new(task, Utc::now());

        let permits = Arc::new(Semaphore::new(self.options.concurrency));
        let mut workers: JoinSet<WorkerResult> = JoinSet::new();
        let mut failed_dirs: HashSet<PathBuf> = HashSet::new();
        let mut abort: Option<AuthError> = None;

        loop {
            while let Some(joined) = workers.try_join_next() {
                absorb(joined, &mut report, &mut abort);
            }
            if abort.is_some() {
                break;
            }

            let event = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.mark_cancelled();
                    break;
                }
                event = walk.next_event() => event,
            };
            let Some(event) = event else {
                break;
            };

            match event {
                WalkEvent::FolderStarted { node, local_path } => {
                    if let Err(e) = mirror.ensure_dir(&local_path).await {
                        warn!(path = %local_path.display(), error = %e, "Cannot create directory");
                        failed_dirs.insert(local_path.clone());
                        report.record(ItemResult::failed(&node, local_path, e.to_string()));
                    }
                }
                WalkEvent::File { node, local_path } => {
                    let permit = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            report.mark_cancelled();
                            break;
                        }
                        permit = permits.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };

                    let fetcher = self.fetcher.clone();
                    let mirror = mirror.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        if let Some(parent) = local_path.parent() {
                            if let Err(e) = mirror.ensure_dir(parent).await {
                                return Ok(ItemResult::failed(&node, &local_path, e.to_string()));
                            }
                        }
                        fetcher.fetch(&node, &local_path).await
                    });
                }
                WalkEvent::FolderFinished {
                    node,
                    local_path,
                    error,
                    is_root,
                } => match error {
                    Some(e) => {
                        report.record(ItemResult::failed(
                            &node,
                            local_path,
                            format!("listing failed: {}", e),
                        ));
                    }
                    None if is_root || failed_dirs.contains(&local_path) => {}
                    None => report.record(ItemResult::success(&node, local_path, 0)),
                },
                WalkEvent::Cycle { node, local_path } => {
                    report.record(ItemResult::skipped(
                        &node,
                        local_path,
                        SkipReason::CycleDetected,
                    ));
                }
                WalkEvent::Aborted(reason) => {
                    abort = Some(reason);
                }
            }
        }

        if abort.is_some() {
            workers.abort_all();
        } else if report.is_cancelled() {
            info!(in_flight = workers.len(), "Cancellation requested, draining in-flight fetches");
        }

        while let Some(joined) = workers.join_next().await {
            absorb(joined, &mut report, &mut abort);
            if abort.is_some() {
                workers.abort_all();
            }
        }

        let report = report.finish(Utc::now());
        if let Some(reason) = abort {
            error!(
                error = %reason,
                recorded = report.len(),
                "Sync aborted: credential no longer usable"
            );
            return Err(SyncError::Aborted {
                reason,
                partial: Box::new(report),
            });
        }

        info!(
            succeeded = report.succeeded(),
            skipped = report.skipped(),
            failed = report.failed(),
            total_bytes = report.total_bytes(),
            cancelled = report.is_cancelled(),
            duration_ms = report.duration_ms().unwrap_or_default(),
            "Sync finished"
        );
        Ok(report)
    }

    /// Fetches the root's metadata and checks that it can be traversed.
    async fn resolve_root(&self, id: &RemoteId) -> Result<RemoteNode, SyncError> {
        let node = self.walker.get_node(id).await.map_err(|e| match e {
            ListingError::Auth(reason) => SyncError::Auth(reason),
            ListingError::Provider(source) => SyncError::Root {
                id: id.clone(),
                source,
            },
        })?;
        if node.kind != NodeKind::Folder {
            return Err(SyncError::NotAFolder {
                id: node.id,
                name: node.name,
            });
        }
        Ok(node)
    }
}

/// Folds one finished worker into the report. The first `AuthError` wins.
fn absorb(
    joined: Result<WorkerResult, JoinError>,
    report: &mut SyncReport,
    abort: &mut Option<AuthError>,
) {
    match joined {
        Ok(Ok(item)) => {
            debug!(path = %item.local_path.display(), outcome = ?item.outcome, "Item done");
            report.record(item);
        }
        Ok(Err(reason)) => {
            if abort.is_none() {
                *abort = Some(reason);
            }
        }
        Err(e) if e.is_cancelled() => {}
        Err(e) => error!(error = %e, "Fetch worker panicked"),
    }
}
