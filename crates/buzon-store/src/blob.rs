//! Attachment blob stores
//!
//! Content is opaque. Each blob gets a [`BlobRef`] carrying its size and
//! SHA-256 so callers can verify what they read back.

use crate::error::StoreResult;
use crate::model::{now, BlobRef};
use crate::spi::BlobStore;
use buzon_model::{BlobId, CaseId};
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

fn describe(case_id: CaseId, content_type: &str, bytes: &[u8]) -> BlobRef {
    BlobRef {
        id: BlobId::new(),
        case_id,
        content_type: content_type.to_string(),
        size_bytes: bytes.len() as u64,
        sha256: hex::encode(Sha256::digest(bytes)),
        stored_at: now(),
    }
}

/// Memory-backed blob store
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<CaseId, Vec<(BlobRef, Vec<u8>)>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put_blob(&self, case_id: CaseId, content_type: &str, bytes: Vec<u8>) -> StoreResult<BlobRef> {
        let blob = describe(case_id, content_type, &bytes);
        self.blobs
            .entry(case_id)
            .or_default()
            .push((blob.clone(), bytes));
        Ok(blob)
    }

    async fn list_blobs(&self, case_id: CaseId) -> StoreResult<Vec<BlobRef>> {
        Ok(self
            .blobs
            .get(&case_id)
            .map(|entries| entries.iter().map(|(r, _)| r.clone()).collect())
            .unwrap_or_default())
    }

    async fn get_blob(&self, case_id: CaseId, id: BlobId) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.blobs.get(&case_id).and_then(|entries| {
            entries
                .iter()
                .find(|(r, _)| r.id == id)
                .map(|(_, bytes)| bytes.clone())
        }))
    }
}

/// Filesystem blob store
///
/// Layout: `<root>/<case id>/<blob id>.bin` with a `<blob id>.json`
/// metadata sidecar.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn case_dir(&self, case_id: CaseId) -> PathBuf {
        self.root.join(case_id.to_string())
    }
}

#[async_trait::async_trait]
impl BlobStore for FsBlobStore {
    async fn put_blob(&self, case_id: CaseId, content_type: &str, bytes: Vec<u8>) -> StoreResult<BlobRef> {
        let blob = describe(case_id, content_type, &bytes);
        let dir = self.case_dir(case_id);
        tokio::fs::create_dir_all(&dir).await?;

        // Content first, so a listed sidecar always has its content
        tokio::fs::write(dir.join(format!("{}.bin", blob.id)), &bytes).await?;
        tokio::fs::write(dir.join(format!("{}.json", blob.id)), serde_json::to_vec(&blob)?).await?;

        tracing::debug!(case_id = %case_id, blob_id = %blob.id, size = blob.size_bytes, "stored blob");
        Ok(blob)
    }

    async fn list_blobs(&self, case_id: CaseId) -> StoreResult<Vec<BlobRef>> {
        let dir = self.case_dir(case_id);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut blobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = tokio::fs::read(&path).await?;
            blobs.push(serde_json::from_slice::<BlobRef>(&raw)?);
        }
        // ULIDs order by creation
        blobs.sort_by_key(|b| b.id);
        Ok(blobs)
    }

    async fn get_blob(&self, case_id: CaseId, id: BlobId) -> StoreResult<Option<Vec<u8>>> {
        let path = self.case_dir(case_id).join(format!("{id}.bin"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
