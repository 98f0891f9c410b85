//! # source: runbook discovery for a commit
//!
//! [`DocumentSource`] lists the commit tree through the [`VcsClient`] and keeps
//! blobs that look like runbooks and are not excluded by policy. Only tree
//! metadata is read here; content is fetched later, per document.
//!
//! The tree id of a commit is looked up at most once per source: results are
//! cached by `(repository, sha)` for the lifetime of the [`DocumentSource`].

use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::RunPolicy;
use crate::contract::{EntryKind, VcsClient};
use crate::error::{BailReason, Halt};
use crate::system_code::is_runbook_path;
use crate::trigger::RunContext;

/// A runbook found in the tree, not yet ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentCandidate {
    pub path: String,
    pub blob_id: String,
    /// Pre-loaded content; fetched lazily by the processor when absent.
    pub content: Option<String>,
}

pub struct DocumentSource<'a, V: VcsClient + ?Sized> {
    vcs: &'a V,
    tree_ids: Mutex<HashMap<(String, String), String>>,
}

impl<'a, V: VcsClient + ?Sized> DocumentSource<'a, V> {
    pub fn new(vcs: &'a V) -> Self {
        Self {
            vcs,
            tree_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Tree id for the context's commit, from the payload, the cache, or the VCS.
    pub async fn tree_id(&self, context: &RunContext) -> Result<String, Halt> {
        if let Some(tree_id) = context.tree_id.as_deref().filter(|id| !id.is_empty()) {
            return Ok(tree_id.to_string());
        }

        let key = (context.repository.clone(), context.commit_sha.clone());
        let mut cache = self.tree_ids.lock().await;
        if let Some(tree_id) = cache.get(&key) {
            return Ok(tree_id.clone());
        }

        let tree_id = self
            .vcs
            .commit_tree_id(&context.repository, &context.commit_sha)
            .await
            .map_err(|e| Halt::abort(e, "GET_COMMIT_FAILED"))?;
        debug!(commit_sha = %context.commit_sha, tree_id = %tree_id, "[SOURCE] Resolved tree id from commit");
        cache.insert(key, tree_id.clone());
        Ok(tree_id)
    }

    /// All runbooks in the commit tree, minus policy exclusions.
    pub async fn candidates(
        &self,
        context: &RunContext,
        policy: &RunPolicy,
    ) -> Result<Vec<DocumentCandidate>, Halt> {
        let tree_id = self.tree_id(context).await?;
        let tree = self
            .vcs
            .list_tree(&context.repository, &tree_id)
            .await
            .map_err(|e| Halt::abort(e, "GET_TREE_FAILED"))?;

        let entries = tree.len();
        let candidates: Vec<DocumentCandidate> = tree
            .into_iter()
            .filter(|entry| {
                entry.kind == EntryKind::Blob
                    && is_runbook_path(&entry.path)
                    && !policy.is_path_excluded(&entry.path)
            })
            .map(|entry| DocumentCandidate {
                path: entry.path,
                blob_id: entry.blob_id,
                content: None,
            })
            .collect();

        if candidates.is_empty() {
            return Err(Halt::bail(BailReason::NoCandidates));
        }
        info!(entries, candidates = candidates.len(), "[SOURCE] Collected runbooks from tree");
        Ok(candidates)
    }
}
