//! In-memory fakes of the three ports and helpers shared by engine tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use drivemirror_core::domain::{
    Credential, ExportFormat, PageToken, ProviderError, RemoteId, RemoteNode, FOLDER_MIME_TYPE,
};
use drivemirror_core::ports::{
    Download, ICredentialStore, IRemoteTree, ITokenRefresher, ListingPage, RefreshError,
    RefreshedToken,
};
use drivemirror_sync::{CredentialManager, RetryPolicy, SyncOptions, SyncOrchestrator};
use futures_util::{stream, StreamExt};
use tokio::sync::Semaphore;

/// Chunk size of fake download streams
const CHUNK: usize = 8;

pub fn id(value: &str) -> RemoteId {
    RemoteId::new(value.to_string()).unwrap()
}

pub fn folder(node_id: &str, name: &str, parent: &str) -> RemoteNode {
    RemoteNode::new(id(node_id), name, FOLDER_MIME_TYPE, vec![id(parent)], None)
}

pub fn file(node_id: &str, name: &str, parent: &str, size: u64) -> RemoteNode {
    RemoteNode::new(
        id(node_id),
        name,
        "application/octet-stream",
        vec![id(parent)],
        Some(size),
    )
}

pub fn document(node_id: &str, name: &str, mime: &str, parent: &str) -> RemoteNode {
    RemoteNode::new(id(node_id), name, mime, vec![id(parent)], None)
}

/// Retries quickly so tests stay fast while still exercising backoff.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5))
}

// ============================================================================
// FakeTree
// ============================================================================

/// Remote tree held in memory, with failure injection
#[derive(Default)]
pub struct FakeTree {
    listings: Mutex<HashMap<RemoteId, Vec<Vec<RemoteNode>>>>,
    nodes: Mutex<HashMap<RemoteId, RemoteNode>>,
    contents: Mutex<HashMap<RemoteId, Vec<u8>>>,
    failures: Mutex<HashMap<RemoteId, VecDeque<ProviderError>>>,
    always: Mutex<HashMap<RemoteId, ProviderError>>,
    listing_failures: Mutex<HashMap<RemoteId, VecDeque<ProviderError>>>,
    truncations: Mutex<HashMap<RemoteId, usize>>,
    stalls: Mutex<HashSet<RemoteId>>,
    announced: Mutex<HashMap<RemoteId, u64>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    pub list_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub exports: Mutex<Vec<(RemoteId, String)>>,
    pub tokens: Mutex<Vec<String>>,
}

impl FakeTree {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Single listing page for `folder_id`.
    pub fn folder(&self, folder_id: &str, children: Vec<RemoteNode>) {
        self.paged_folder(folder_id, vec![children]);
    }

    /// Registers the children and, unless known already, the folder itself.
    pub fn paged_folder(&self, folder_id: &str, pages: Vec<Vec<RemoteNode>>) {
        let mut nodes = self.nodes.lock().unwrap();
        nodes
            .entry(id(folder_id))
            .or_insert_with(|| folder(folder_id, folder_id, "parent-of-root"));
        for node in pages.iter().flatten() {
            nodes.insert(node.id.clone(), node.clone());
        }
        self.listings.lock().unwrap().insert(id(folder_id), pages);
    }

    pub fn register(&self, node: RemoteNode) {
        self.nodes.lock().unwrap().insert(node.id.clone(), node);
    }

    pub fn content(&self, node_id: &str, bytes: &[u8]) {
        self.contents
            .lock()
            .unwrap()
            .insert(id(node_id), bytes.to_vec());
    }

    /// The next `times` calls touching `node_id` fail with `error`.
    pub fn fail_times(&self, node_id: &str, times: usize, error: ProviderError) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(id(node_id)).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// Every call touching `node_id` fails with `error`.
    pub fn fail_always(&self, node_id: &str, error: ProviderError) {
        self.always.lock().unwrap().insert(id(node_id), error);
    }

    /// The next `times` listings of `folder_id` fail with `error`; metadata
    /// lookups are unaffected.
    pub fn fail_listing_times(&self, folder_id: &str, times: usize, error: ProviderError) {
        let mut failures = self.listing_failures.lock().unwrap();
        let queue = failures.entry(id(folder_id)).or_default();
        for _ in 0..times {
            queue.push_back(error.clone());
        }
    }

    /// The next `times` transfers of `node_id` break after the first chunk.
    pub fn truncate_times(&self, node_id: &str, times: usize) {
        self.truncations.lock().unwrap().insert(id(node_id), times);
    }

    /// Transfers of `node_id` yield the first chunk and then hang forever.
    pub fn stall_after_first_chunk(&self, node_id: &str) {
        self.stalls.lock().unwrap().insert(id(node_id));
    }

    /// Downloads of `node_id` announce `size` whatever the content length.
    pub fn announce(&self, node_id: &str, size: u64) {
        self.announced.lock().unwrap().insert(id(node_id), size);
    }

    /// Transfers wait for a permit of `gate` before starting.
    pub fn gate(&self, gate: Arc<Semaphore>) {
        *self.gate.lock().unwrap() = Some(gate);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    fn check_failure(&self, node_id: &RemoteId) -> Result<(), ProviderError> {
        if let Some(error) = self.always.lock().unwrap().get(node_id) {
            return Err(error.clone());
        }
        match self
            .failures
            .lock()
            .unwrap()
            .get_mut(node_id)
            .and_then(|queue| queue.pop_front())
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn open(&self, node: &RemoteNode, announce_size: bool) -> Result<Download, ProviderError> {
        self.check_failure(&node.id)?;

        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        let content = self
            .contents
            .lock()
            .unwrap()
            .get(&node.id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(node.id.to_string()))?;

        let truncate = {
            let mut truncations = self.truncations.lock().unwrap();
            match truncations.get_mut(&node.id) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };

        let announced = self.announced.lock().unwrap().get(&node.id).copied();
        let total_bytes = announce_size.then(|| announced.unwrap_or(content.len() as u64));
        let mut chunks: Vec<Result<Bytes, ProviderError>> = content
            .chunks(CHUNK)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        if truncate {
            chunks.truncate(1);
            chunks.push(Err(ProviderError::Network("connection reset".into())));
        }

        if self.stalls.lock().unwrap().contains(&node.id) {
            chunks.truncate(1);
            return Ok(Download {
                total_bytes,
                stream: Box::pin(stream::iter(chunks).chain(stream::pending())),
            });
        }

        Ok(Download {
            total_bytes,
            stream: Box::pin(stream::iter(chunks)),
        })
    }
}

#[async_trait::async_trait]
impl IRemoteTree for FakeTree {
    async fn list_children(
        &self,
        access_token: &str,
        folder_id: &RemoteId,
        page_token: Option<&PageToken>,
    ) -> Result<ListingPage, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(access_token.to_string());
        if let Some(error) = self
            .listing_failures
            .lock()
            .unwrap()
            .get_mut(folder_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        self.check_failure(folder_id)?;

        let pages = self
            .listings
            .lock()
            .unwrap()
            .get(folder_id)
            .cloned()
            .unwrap_or_default();
        let index = page_token
            .map(|token| token.as_str().parse::<usize>().unwrap())
            .unwrap_or(0);

        Ok(ListingPage {
            nodes: pages.get(index).cloned().unwrap_or_default(),
            next_page_token: (index + 1 < pages.len())
                .then(|| PageToken::new((index + 1).to_string()).unwrap()),
        })
    }

    async fn get_node(&self, access_token: &str, node_id: &RemoteId) -> Result<RemoteNode, ProviderError> {
        self.tokens.lock().unwrap().push(access_token.to_string());
        self.check_failure(node_id)?;
        self.nodes
            .lock()
            .unwrap()
            .get(node_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(node_id.to_string()))
    }

    async fn download(&self, access_token: &str, node: &RemoteNode) -> Result<Download, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(access_token.to_string());
        self.open(node, true).await
    }

    async fn export(
        &self,
        access_token: &str,
        node: &RemoteNode,
        format: &ExportFormat,
    ) -> Result<Download, ProviderError> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(access_token.to_string());
        self.exports
            .lock()
            .unwrap()
            .push((node.id.clone(), format.mime_type.to_string()));
        self.open(node, false).await
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
pub struct MemoryStore {
    credential: Mutex<Option<Credential>>,
    fail_saves: bool,
    pub saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with(credential: Credential) -> Arc<Self> {
        Arc::new(Self {
            credential: Mutex::new(Some(credential)),
            ..Self::default()
        })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A store that loads `credential` but refuses every save.
    pub fn read_only(credential: Credential) -> Arc<Self> {
        Arc::new(Self {
            credential: Mutex::new(Some(credential)),
            fail_saves: true,
            ..Self::default()
        })
    }

    pub fn current(&self) -> Option<Credential> {
        self.credential.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ICredentialStore for MemoryStore {
    async fn load(&self) -> anyhow::Result<Option<Credential>> {
        Ok(self.current())
    }

    async fn save(&self, credential: &Credential) -> anyhow::Result<()> {
        if self.fail_saves {
            anyhow::bail!("store is read-only");
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.credential.lock().unwrap() = Some(credential.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.credential.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// FakeRefresher
// ============================================================================

/// Token endpoint stand-in; answers from a script, then succeeds
#[derive(Default)]
pub struct FakeRefresher {
    script: Mutex<VecDeque<Result<RefreshedToken, RefreshError>>>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FakeRefresher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Each refresh takes `delay`, long enough for callers to pile up.
    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn scripted(responses: Vec<Result<RefreshedToken, RefreshError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(responses.into()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ITokenRefresher for FakeRefresher {
    async fn refresh(&self, _credential: &Credential) -> Result<RefreshedToken, RefreshError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(response) = self.script.lock().unwrap().pop_front() {
            return response;
        }
        Ok(RefreshedToken {
            access_token: format!("fresh-token-{}", n),
            expires_in: Some(Duration::from_secs(3600)),
            refresh_token: None,
        })
    }
}

// ============================================================================
// Credentials and wiring
// ============================================================================

pub fn credential(expires_in_secs: i64, refresh_token: Option<&str>) -> Credential {
    Credential {
        access_token: "initial-token".into(),
        refresh_token: refresh_token.map(str::to_string),
        token_uri: "https://oauth2.googleapis.com/token".into(),
        client_id: "client.apps.googleusercontent.com".into(),
        client_secret: Some("secret".into()),
        scopes: ["https://www.googleapis.com/auth/drive.readonly".to_string()]
            .into_iter()
            .collect(),
        expiry: Utc::now() + chrono::Duration::seconds(expires_in_secs),
    }
}

/// A credential valid for another hour.
pub fn valid_credential() -> Credential {
    credential(3600, Some("1//refresh"))
}

/// A credential that expired five minutes ago but can be refreshed.
pub fn expired_credential() -> Credential {
    credential(-300, Some("1//refresh"))
}

pub fn manager(store: Arc<MemoryStore>, refresher: Arc<FakeRefresher>) -> Arc<CredentialManager> {
    Arc::new(CredentialManager::new(
        store,
        refresher,
        fast_retry(),
        Duration::from_secs(300),
    ))
}

pub fn orchestrator(tree: Arc<FakeTree>, concurrency: usize) -> SyncOrchestrator {
    orchestrator_with(tree, manager(MemoryStore::with(valid_credential()), FakeRefresher::new()), concurrency)
}

pub fn orchestrator_with(
    tree: Arc<FakeTree>,
    credentials: Arc<CredentialManager>,
    concurrency: usize,
) -> SyncOrchestrator {
    SyncOrchestrator::with_tree(
        tree,
        credentials,
        fast_retry(),
        SyncOptions::default().with_concurrency(concurrency),
    )
}

/// Relative paths of every regular file under `root`, sorted.
pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir).unwrap() {
            let entry = entry.unwrap();
            let path = entry.path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path.strip_prefix(root).unwrap().to_path_buf());
            }
        }
    }
    found.sort();
    found
}
