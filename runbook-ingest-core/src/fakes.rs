//! In-memory fakes for the collaborator traits (testing only)
//!
//! Provides `InMemoryVcs`, `ScriptedIngester`, `MemoryResultStore` and
//! `RecordingReporter`, which satisfy the contracts in [`crate::contract`]
//! without network or disk access and record how they were called.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::contract::*;

// ---------------------------------------------------------------------------
// InMemoryVcs
// ---------------------------------------------------------------------------

/// A single-commit repository held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVcs {
    tree_id: String,
    entries: Vec<TreeEntry>,
    blobs: HashMap<String, String>,
    unavailable: bool,
    tree_lookups: AtomicUsize,
}

impl InMemoryVcs {
    pub fn new(tree_id: impl Into<String>) -> Self {
        Self {
            tree_id: tree_id.into(),
            ..Self::default()
        }
    }

    /// Add a blob at `path`. The blob id is derived from the path.
    pub fn with_file(mut self, path: &str, content: &str) -> Self {
        let blob_id = Self::blob_id(path);
        self.entries.push(TreeEntry {
            path: path.to_string(),
            kind: EntryKind::Blob,
            blob_id: blob_id.clone(),
        });
        self.blobs.insert(blob_id, content.to_string());
        self
    }

    pub fn with_dir(mut self, path: &str) -> Self {
        self.entries.push(TreeEntry {
            path: path.to_string(),
            kind: EntryKind::Tree,
            blob_id: format!("tree-{path}"),
        });
        self
    }

    /// Every call fails, as if the VCS API were down.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn blob_id(path: &str) -> String {
        format!("blob-{}", path.replace('/', "-"))
    }

    pub fn tree_lookups(&self) -> usize {
        self.tree_lookups.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), CollaboratorError> {
        if self.unavailable {
            return Err("vcs unavailable".into());
        }
        Ok(())
    }
}

#[async_trait]
impl VcsClient for InMemoryVcs {
    async fn commit_tree_id(&self, _repository: &str, _sha: &str) -> Result<String, CollaboratorError> {
        self.check_available()?;
        self.tree_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.tree_id.clone())
    }

    async fn list_tree(
        &self,
        _repository: &str,
        tree_id: &str,
    ) -> Result<Vec<TreeEntry>, CollaboratorError> {
        self.check_available()?;
        if tree_id != self.tree_id {
            return Err(format!("unknown tree {tree_id}").into());
        }
        Ok(self.entries.clone())
    }

    async fn blob_content(
        &self,
        _repository: &str,
        blob_id: &str,
    ) -> Result<Option<String>, CollaboratorError> {
        self.check_available()?;
        Ok(self.blobs.get(blob_id).cloned())
    }
}

// ---------------------------------------------------------------------------
// ScriptedIngester
// ---------------------------------------------------------------------------

/// Replies per path with a scripted result, succeeding with no details by default.
/// Tracks how many calls were in flight at once.
#[derive(Debug, Default)]
pub struct ScriptedIngester {
    replies: HashMap<String, Result<IngestResponse, IngestError>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<(Instant, IngestRequest)>>,
}

impl ScriptedIngester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(mut self, path: &str, reply: Result<IngestResponse, IngestError>) -> Self {
        self.replies.insert(path.to_string(), reply);
        self
    }

    /// Each call sleeps this long before replying.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Requests in arrival order, with the instant each call started.
    pub fn requests(&self) -> Vec<(Instant, IngestRequest)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ingester for ScriptedIngester {
    async fn ingest(&self, request: IngestRequest) -> Result<IngestResponse, IngestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.replies
            .get(&request.path)
            .cloned()
            .unwrap_or_else(|| Ok(IngestResponse::default()))
    }
}

// ---------------------------------------------------------------------------
// MemoryResultStore
// ---------------------------------------------------------------------------

/// Result store backed by a `HashMap<(repository, key), record>`.
#[derive(Debug, Default)]
pub struct MemoryResultStore {
    records: Mutex<HashMap<(String, String), StoredRecord>>,
    fail_writes: bool,
    writes: Mutex<Vec<String>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `put` fails.
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Keys of attempted writes, in order.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn put(
        &self,
        repository: &str,
        key: &str,
        record: &StoredRecord,
    ) -> Result<(), CollaboratorError> {
        self.writes.lock().unwrap().push(key.to_string());
        if self.fail_writes {
            return Err(format!("write to {key} rejected").into());
        }
        self.records
            .lock()
            .unwrap()
            .insert((repository.to_string(), key.to_string()), record.clone());
        Ok(())
    }

    async fn get(&self, repository: &str, key: &str) -> Result<StoredRecord, CollaboratorError> {
        self.records
            .lock()
            .unwrap()
            .get(&(repository.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| format!("no record for {repository}/{key}").into())
    }
}

// ---------------------------------------------------------------------------
// RecordingReporter
// ---------------------------------------------------------------------------

/// Keeps every published report.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    published: Mutex<Vec<(String, String, CheckReport)>>,
    fail: bool,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// `(repository, sha, report)` per publish call.
    pub fn published(&self) -> Vec<(String, String, CheckReport)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn publish(
        &self,
        repository: &str,
        sha: &str,
        report: &CheckReport,
    ) -> Result<String, CollaboratorError> {
        if self.fail {
            return Err("status api unavailable".into());
        }
        let mut published = self.published.lock().unwrap();
        published.push((repository.to_string(), sha.to_string(), report.clone()));
        Ok(format!(
            "https://checks.example.test/{repository}/{sha}/{}",
            published.len()
        ))
    }
}
