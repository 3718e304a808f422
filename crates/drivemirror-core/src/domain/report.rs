//! Per-run records: the task, one result per visited node, and the report
//!
//! A [`SyncReport`] is created empty when a run starts, appended to while the
//! run progresses and handed to the caller by value once [`SyncReport::finish`]
//! has sealed it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::newtypes::RemoteId;
use super::node::{NodeKind, RemoteNode};

// ============================================================================
// SyncTask
// ============================================================================

/// Identifies one synchronization invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTask {
    pub run_id: Uuid,
    pub remote_root_id: RemoteId,
    pub local_root: PathBuf,
    pub created_at: DateTime<Utc>,
}

impl SyncTask {
    pub fn new(remote_root_id: RemoteId, local_root: impl Into<PathBuf>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            remote_root_id,
            local_root: local_root.into(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Why a node was deliberately not materialized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Workspace document without an export mapping
    UnsupportedType { mime_type: String },
    /// Folder that is its own ancestor
    CycleDetected,
}

/// Final state of one visited node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Skipped(SkipReason),
    Failed,
}

// ============================================================================
// ItemResult
// ============================================================================

/// Outcome record for a single node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub node_id: RemoteId,
    pub name: String,
    pub kind: NodeKind,
    pub local_path: PathBuf,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    pub bytes_written: u64,
}

impl ItemResult {
    pub fn success(node: &RemoteNode, local_path: impl Into<PathBuf>, bytes_written: u64) -> Self {
        Self::build(node, local_path.into(), Outcome::Success, None, bytes_written)
    }

    pub fn skipped(node: &RemoteNode, local_path: impl Into<PathBuf>, reason: SkipReason) -> Self {
        Self::build(node, local_path.into(), Outcome::Skipped(reason), None, 0)
    }

    pub fn failed(
        node: &RemoteNode,
        local_path: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::build(
            node,
            local_path.into(),
            Outcome::Failed,
            Some(detail.into()),
            0,
        )
    }

    fn build(
        node: &RemoteNode,
        local_path: PathBuf,
        outcome: Outcome,
        error_detail: Option<String>,
        bytes_written: u64,
    ) -> Self {
        Self {
            node_id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            local_path,
            outcome,
            error_detail,
            bytes_written,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

// ============================================================================
// SyncReport
// ============================================================================

/// Aggregate outcome of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    task: SyncTask,
    items: Vec<ItemResult>,
    succeeded: usize,
    skipped: usize,
    failed: usize,
    total_bytes: u64,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    cancelled: bool,
}

impl SyncReport {
    /// Creates an empty report for `task`.
    pub fn new(task: SyncTask, started_at: DateTime<Utc>) -> Self {
        Self {
            task,
            items: Vec::new(),
            succeeded: 0,
            skipped: 0,
            failed: 0,
            total_bytes: 0,
            started_at,
            finished_at: None,
            cancelled: false,
        }
    }

    /// Appends one result and updates the aggregate counters.
    pub fn record(&mut self, item: ItemResult) {
        match item.outcome {
            Outcome::Success => {
                self.succeeded += 1;
                self.total_bytes += item.bytes_written;
            }
            Outcome::Skipped(_) => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
        self.items.push(item);
    }

    /// Flags the run as stopped by a cancellation request.
    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    /// Seals the report. Items are ordered by local path so that two runs
    /// over the same tree produce comparable reports.
    pub fn finish(mut self, finished_at: DateTime<Utc>) -> Self {
        self.items.sort_by(|a, b| a.local_path.cmp(&b.local_path));
        self.finished_at = Some(finished_at);
        self
    }

    pub fn task(&self) -> &SyncTask {
        &self.task
    }

    pub fn items(&self) -> &[ItemResult] {
        &self.items
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Local paths of successfully materialized files, for downstream consumers.
    pub fn success_paths(&self) -> impl Iterator<Item = &Path> {
        self.items
            .iter()
            .filter(|item| item.is_success() && item.kind != NodeKind::Folder)
            .map(|item| item.local_path.as_path())
    }

    /// Wall-clock duration in milliseconds, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
