//! JSON-file result store.
//!
//! One file per `(repository, key)` under the results directory, named by the
//! SHA-256 of the pair so that repository slugs and paths never leak into
//! file names.

use std::path::PathBuf;

use async_trait::async_trait;
use runbook_ingest_core::contract::{CollaboratorError, ResultStore, StoredRecord};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct FileResultStore {
    root: PathBuf,
}

impl FileResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// File holding the record for `(repository, key)`.
    pub fn record_path(&self, repository: &str, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(repository.as_bytes());
        hasher.update([0u8]);
        hasher.update(key.as_bytes());
        self.root.join(format!("{:x}.json", hasher.finalize()))
    }
}

#[async_trait]
impl ResultStore for FileResultStore {
    async fn put(
        &self,
        repository: &str,
        key: &str,
        record: &StoredRecord,
    ) -> Result<(), CollaboratorError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.record_path(repository, key);
        // one staging file per write so concurrent puts to a key never collide
        let staging = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
        tokio::fs::write(&staging, serde_json::to_vec_pretty(record)?).await?;
        tokio::fs::rename(&staging, &path).await?;
        tracing::debug!(repository, key, path = ?path, "Stored record");
        Ok(())
    }

    async fn get(&self, repository: &str, key: &str) -> Result<StoredRecord, CollaboratorError> {
        let path = self.record_path(repository, key);
        let raw = tokio::fs::read(&path)
            .await
            .map_err(|e| format!("no record for {repository} {key} at {path:?}: {e}"))?;
        Ok(serde_json::from_slice(&raw)?)
    }
}
