//! Blob store boundary.
//!
//! The service only keeps the id a store hands back plus a human filename.
//! [`FsBlobStore`] is the bundled implementation: content addressed by the
//! SHA-256 of the bytes, with a JSON sidecar holding the metadata.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::{Result, ServiceError};

/// Opaque reference returned by a store.
pub type BlobId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlobMetadata {
    pub filename: String,
    pub content_type: String,
    pub size: u64,
    pub uploaded_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub metadata: BlobMetadata,
    pub bytes: Vec<u8>,
}

/// A file received from a client, not yet stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        bytes: &[u8],
        content_type: &str,
        filename: &str,
        uploaded_by: Option<Uuid>,
    ) -> Result<BlobId>;

    async fn get(&self, id: &str) -> Result<StoredBlob>;
}

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        info!(root = %root.display(), "Blob store ready");
        Ok(Self { root })
    }

    fn data_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

/// Ids are lowercase hex SHA-256 digests; anything else never names a blob.
fn is_blob_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(
        &self,
        bytes: &[u8],
        content_type: &str,
        filename: &str,
        uploaded_by: Option<Uuid>,
    ) -> Result<BlobId> {
        let id = hex::encode(Sha256::digest(bytes));

        // Same content, same id. The first upload's metadata wins.
        if tokio::fs::try_exists(self.data_path(&id)).await? {
            debug!(blob = %id, "Blob already stored");
            return Ok(id);
        }

        let metadata = BlobMetadata {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size: bytes.len() as u64,
            uploaded_by,
            created_at: Utc::now(),
        };
        tokio::fs::write(self.meta_path(&id), serde_json::to_vec(&metadata)?).await?;
        tokio::fs::write(self.data_path(&id), bytes).await?;
        debug!(blob = %id, size = metadata.size, "Blob stored");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<StoredBlob> {
        if !is_blob_id(id) {
            return Err(ServiceError::not_found("file"));
        }
        let bytes = match tokio::fs::read(self.data_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ServiceError::not_found("file"))
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = serde_json::from_slice(&tokio::fs::read(self.meta_path(id)).await?)?;
        Ok(StoredBlob { metadata, bytes })
    }
}

/// Store every file, returning `(id, filename)` pairs in input order.
pub async fn store_all(
    store: &dyn BlobStore,
    files: &[IncomingFile],
    uploaded_by: Option<Uuid>,
) -> Result<Vec<(BlobId, String)>> {
    let mut out = Vec::with_capacity(files.len());
    for f in files {
        let id = store
            .put(&f.bytes, &f.content_type, &f.filename, uploaded_by)
            .await?;
        out.push((id, f.filename.clone()));
    }
    Ok(out)
}
