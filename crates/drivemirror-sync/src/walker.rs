//! Paginated, cycle-safe traversal of the remote tree
//!
//! [`RemoteTreeWalker::walk`] returns a [`Walk`]: a lazy sequence of
//! [`WalkEvent`]s produced depth-first, children in listing order. Nothing is
//! fetched until the caller asks for the next event, and at most one listing
//! page per open folder is held in memory.
//!
//! ## Traversal state
//!
//! Recursion is replaced by an explicit stack of folder frames. Every folder
//! entered gets an arena slot pointing at its parent's slot, so the active
//! path from any folder back to the root can be walked without recursion. A
//! folder whose id already appears on that path is reported as
//! [`WalkEvent::Cycle`] and not entered. The same folder reached through two
//! unrelated parents is not a cycle and is visited twice.
//!
//! ## Failures
//!
//! A listing failure (after retries) closes that folder with an error and the
//! walk continues with its siblings. An [`AuthError`] ends the walk.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::domain::{AuthError, NodeKind, PageToken, ProviderError, RemoteId, RemoteNode};
use drivemirror_core::ports::{IRemoteTree, ListingPage};
use futures_util::stream::{self, Stream};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::credentials::CredentialManager;
use crate::mirror::LocalMirrorBuilder;
use crate::retry::{Classify, RetryPolicy};

/// Failure of a single listing call
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ListingError {
    #[error(transparent)]
    Auth(AuthError),
    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for ListingError {
    fn from(err: ProviderError) -> Self {
        match err.as_auth_error() {
            Some(auth) => ListingError::Auth(auth),
            None => ListingError::Provider(err),
        }
    }
}

impl Classify for ListingError {
    fn is_transient(&self) -> bool {
        matches!(self, ListingError::Provider(e) if e.is_transient())
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ListingError::Provider(e) => e.retry_after(),
            ListingError::Auth(_) => None,
        }
    }
}

/// One step of a traversal
#[derive(Debug, Clone, PartialEq)]
pub enum WalkEvent {
    /// A folder is about to be listed; its directory should exist locally
    FolderStarted { node: RemoteNode, local_path: PathBuf },
    /// A non-folder node to fetch
    File { node: RemoteNode, local_path: PathBuf },
    /// All children of a folder have been produced, or its listing failed
    FolderFinished {
        node: RemoteNode,
        local_path: PathBuf,
        error: Option<ProviderError>,
        is_root: bool,
    },
    /// A folder that is its own ancestor; not entered
    Cycle { node: RemoteNode, local_path: PathBuf },
    /// The credential became unusable; no further events follow
    Aborted(AuthError),
}

/// Lists folders on behalf of a traversal
#[derive(Clone)]
pub struct RemoteTreeWalker {
    tree: Arc<dyn IRemoteTree>,
    credentials: Arc<CredentialManager>,
    retry: RetryPolicy,
}

impl RemoteTreeWalker {
    pub fn new(
        tree: Arc<dyn IRemoteTree>,
        credentials: Arc<CredentialManager>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            tree,
            credentials,
            retry,
        }
    }

    /// Fetches one page of `folder_id`'s children, retrying transient failures.
    #[instrument(skip_all, fields(folder = %folder_id))]
    pub async fn list_children(
        &self,
        folder_id: &RemoteId,
        page_token: Option<&PageToken>,
    ) -> Result<ListingPage, ListingError> {
        self.retry
            .run("list_children", || self.list_once(folder_id, page_token))
            .await
    }

    /// Fetches the metadata of one node, retrying transient failures.
    pub async fn get_node(&self, id: &RemoteId) -> Result<RemoteNode, ListingError> {
        self.retry
            .run("get_node", || self.get_once(id))
            .await
    }

    async fn list_once(
        &self,
        folder_id: &RemoteId,
        page_token: Option<&PageToken>,
    ) -> Result<ListingPage, ListingError> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(ListingError::Auth)?;
        Ok(self.tree.list_children(&token, folder_id, page_token).await?)
    }

    async fn get_once(&self, id: &RemoteId) -> Result<RemoteNode, ListingError> {
        let token = self
            .credentials
            .access_token()
            .await
            .map_err(ListingError::Auth)?;
        Ok(self.tree.get_node(&token, id).await?)
    }

    /// Starts a traversal of `root`, mirrored at `local_root`.
    ///
    /// `root` is never reported as a `FolderStarted` event; the caller is
    /// expected to have created `local_root` already.
    pub fn walk(
        &self,
        root: RemoteNode,
        local_root: PathBuf,
        mirror: Arc<LocalMirrorBuilder>,
    ) -> Walk {
        let root_frame = Frame::new(0, root.clone(), local_root);
        Walk {
            walker: self.clone(),
            mirror,
            arena: vec![ArenaEntry {
                id: root.id,
                parent: None,
            }],
            stack: vec![root_frame],
            folders_listed: 0,
            pages: 0,
        }
    }
}

// ============================================================================
// Walk
// ============================================================================

struct ArenaEntry {
    id: RemoteId,
    parent: Option<usize>,
}

struct Frame {
    arena_idx: usize,
    node: RemoteNode,
    local_path: PathBuf,
    next_page: Option<PageToken>,
    exhausted: bool,
    pending: VecDeque<RemoteNode>,
    error: Option<ProviderError>,
}

impl Frame {
    fn new(arena_idx: usize, node: RemoteNode, local_path: PathBuf) -> Self {
        Self {
            arena_idx,
            node,
            local_path,
            next_page: None,
            exhausted: false,
            pending: VecDeque::new(),
            error: None,
        }
    }
}

/// An in-progress traversal
pub struct Walk {
    walker: RemoteTreeWalker,
    mirror: Arc<LocalMirrorBuilder>,
    arena: Vec<ArenaEntry>,
    stack: Vec<Frame>,
    folders_listed: u64,
    pages: u64,
}

impl Walk {
    /// Produces the next event, `None` once the traversal is complete.
    pub async fn next_event(&mut self) -> Option<WalkEvent> {
        loop {
            let frame = self.stack.last_mut()?;

            if let Some(child) = frame.pending.pop_front() {
                let local_path = self.mirror.resolve_path(&frame.local_path, &child);

                if child.kind != NodeKind::Folder {
                    return Some(WalkEvent::File {
                        node: child,
                        local_path,
                    });
                }

                if on_active_path(&self.arena, frame.arena_idx, &child.id) {
                    warn!(folder = %child.id, name = %child.name, "Cycle detected, not descending");
                    return Some(WalkEvent::Cycle {
                        node: child,
                        local_path,
                    });
                }

                let parent_idx = frame.arena_idx;
                self.arena.push(ArenaEntry {
                    id: child.id.clone(),
                    parent: Some(parent_idx),
                });
                self.stack.push(Frame::new(
                    self.arena.len() - 1,
                    child.clone(),
                    local_path.clone(),
                ));
                return Some(WalkEvent::FolderStarted {
                    node: child,
                    local_path,
                });
            }

            if !frame.exhausted && frame.error.is_none() {
                let folder_id = frame.node.id.clone();
                let page_token = frame.next_page.take();
                let first_page = page_token.is_none();

                let result = self
                    .walker
                    .list_children(&folder_id, page_token.as_ref())
                    .await;

                // The stack is unchanged across the await
                let frame = self.stack.last_mut()?;
                match result {
                    Ok(page) => {
                        self.pages += 1;
                        if first_page {
                            self.folders_listed += 1;
                        }
                        frame.pending.extend(page.nodes);
                        frame.next_page = page.next_page_token;
                        frame.exhausted = frame.next_page.is_none();
                    }
                    Err(ListingError::Auth(e)) => {
                        self.stack.clear();
                        return Some(WalkEvent::Aborted(e));
                    }
                    Err(ListingError::Provider(e)) => {
                        warn!(folder = %folder_id, error = %e, "Listing failed, skipping subtree");
                        frame.error = Some(e);
                    }
                }
                continue;
            }

            let frame = self.stack.pop()?;
            let is_root = self.stack.is_empty();
            debug!(folder = %frame.node.id, failed = frame.error.is_some(), "Folder finished");
            if is_root {
                info!(
                    folders = self.folders_listed,
                    pages = self.pages,
                    "Traversal finished"
                );
            }
            return Some(WalkEvent::FolderFinished {
                node: frame.node,
                local_path: frame.local_path,
                error: frame.error,
                is_root,
            });
        }
    }

    /// Adapts the traversal into a `Stream` of events.
    pub fn into_stream(self) -> impl Stream<Item = WalkEvent> {
        stream::unfold(self, |mut walk| async move {
            walk.next_event().await.map(|event| (event, walk))
        })
    }
}

/// Whether `id` is the folder at `idx` or one of its ancestors.
fn on_active_path(arena: &[ArenaEntry], mut idx: usize, id: &RemoteId) -> bool {
    loop {
        let entry = &arena[idx];
        if entry.id == *id {
            return true;
        }
        match entry.parent {
            Some(parent) => idx = parent,
            None => return false,
        }
    }
}
