//! Report blob storage
//!
//! Every blob carries an expiry. `get` tells a missing key apart from an
//! expired one; the periodic sweep removes expired blobs for good.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const METADATA_FILE: &str = ".metadata.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Blob expired: {0}")]
    Expired(String),

    #[error("Invalid blob key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        ttl: Duration,
    ) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Blob, StorageError>;

    /// Time-limited direct URL, or an empty string when the store cannot presign
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;

    /// Remove expired blobs, returning how many went
    async fn cleanup_expired(&self) -> Result<usize, StorageError>;
}

struct MemoryEntry {
    blob: Blob,
    expires_at: DateTime<Utc>,
}

/// In-process blob store
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, MemoryEntry>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        self.blobs.write().insert(
            key.to_string(),
            MemoryEntry {
                blob: Blob {
                    data,
                    content_type: content_type.to_string(),
                },
                expires_at: Utc::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Blob, StorageError> {
        let blobs = self.blobs.read();
        let entry = blobs
            .get(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        if Utc::now() > entry.expires_at {
            return Err(StorageError::Expired(key.to_string()));
        }
        Ok(entry.blob.clone())
    }

    async fn presign(&self, _key: &str, _ttl: Duration) -> Result<String, StorageError> {
        Ok(String::new())
    }

    async fn cleanup_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let mut blobs = self.blobs.write();
        let before = blobs.len();
        blobs.retain(|_, entry| entry.expires_at > now);
        Ok(before - blobs.len())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlobMetadata {
    content_type: String,
    expires_at: DateTime<Utc>,
}

/// Blob store on the local filesystem with a JSON expiry index
pub struct LocalBlobStore {
    base_dir: PathBuf,
    metadata: Mutex<HashMap<String, BlobMetadata>>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl LocalBlobStore {
    /// Open (creating if needed) a store rooted at `base_dir`
    pub async fn open(base_dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;

        let metadata: HashMap<String, BlobMetadata> = match tokio::fs::read(base_dir.join(METADATA_FILE)).await {
            Ok(raw) => serde_json::from_slice(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!(
            "Local blob store opened at {} ({} blobs indexed)",
            base_dir.display(),
            metadata.len()
        );

        Ok(Self {
            base_dir,
            metadata: Mutex::new(metadata),
            persist_lock: tokio::sync::Mutex::new(()),
        })
    }

    async fn persist_metadata(&self) -> Result<(), StorageError> {
        let _guard = self.persist_lock.lock().await;
        let snapshot = serde_json::to_vec_pretty(&*self.metadata.lock())?;

        let tmp = self.base_dir.join(format!("{}.tmp", METADATA_FILE));
        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, self.base_dir.join(METADATA_FILE)).await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
        ttl: Duration,
    ) -> Result<(), StorageError> {
        validate_key(key)?;
        tokio::fs::write(self.base_dir.join(key), data).await?;

        self.metadata.lock().insert(
            key.to_string(),
            BlobMetadata {
                content_type: content_type.to_string(),
                expires_at: Utc::now() + ttl,
            },
        );
        self.persist_metadata().await?;

        debug!(key, "Blob stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Blob, StorageError> {
        validate_key(key)?;
        let meta = self
            .metadata
            .lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        if Utc::now() > meta.expires_at {
            return Err(StorageError::Expired(key.to_string()));
        }

        match tokio::fs::read(self.base_dir.join(key)).await {
            Ok(data) => Ok(Blob {
                data,
                content_type: meta.content_type,
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn presign(&self, _key: &str, _ttl: Duration) -> Result<String, StorageError> {
        Ok(String::new())
    }

    async fn cleanup_expired(&self) -> Result<usize, StorageError> {
        let now = Utc::now();
        let expired: Vec<String> = {
            let mut metadata = self.metadata.lock();
            let keys: Vec<String> = metadata
                .iter()
                .filter(|(_, meta)| meta.expires_at <= now)
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                metadata.remove(key);
            }
            keys
        };

        if expired.is_empty() {
            return Ok(0);
        }
        self.persist_metadata().await?;

        for key in &expired {
            match tokio::fs::remove_file(self.base_dir.join(key)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(key = %key, error = %e, "Failed to delete expired blob"),
            }
        }

        Ok(expired.len())
    }
}

/// Keys are plain file names
fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key != METADATA_FILE
        && !key.starts_with('.')
        && !key.contains(['/', '\\'])
        && !key.contains("..");

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF: &str = "application/pdf";

    #[tokio::test]
    async fn test_memory_put_get() {
        let store = MemoryBlobStore::new();
        store.put("a.pdf", b"%PDF-1.4".to_vec(), PDF, Duration::hours(1)).await.unwrap();

        let blob = store.get("a.pdf").await.unwrap();
        assert_eq!(blob.data, b"%PDF-1.4");
        assert_eq!(blob.content_type, PDF);
        assert!(matches!(store.get("b.pdf").await, Err(StorageError::NotFound(_))));
        assert_eq!(store.presign("a.pdf", Duration::minutes(5)).await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_memory_expiry() {
        let store = MemoryBlobStore::new();
        store.put("old.pdf", vec![1], PDF, Duration::seconds(-1)).await.unwrap();
        store.put("new.pdf", vec![2], PDF, Duration::hours(1)).await.unwrap();

        assert!(matches!(store.get("old.pdf").await, Err(StorageError::Expired(_))));
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(matches!(store.get("old.pdf").await, Err(StorageError::NotFound(_))));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_local_round_trip_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LocalBlobStore::open(dir.path()).await.unwrap();
            store.put("r.pdf", b"report".to_vec(), PDF, Duration::hours(1)).await.unwrap();
            assert_eq!(store.get("r.pdf").await.unwrap().data, b"report");
        }

        let reopened = LocalBlobStore::open(dir.path()).await.unwrap();
        let blob = reopened.get("r.pdf").await.unwrap();
        assert_eq!(blob.data, b"report");
        assert_eq!(blob.content_type, PDF);
        assert!(dir.path().join(METADATA_FILE).exists());
    }

    #[tokio::test]
    async fn test_local_expiry_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();
        store.put("old.pdf", vec![1], PDF, Duration::seconds(-1)).await.unwrap();
        store.put("new.pdf", vec![2], PDF, Duration::hours(1)).await.unwrap();

        assert!(matches!(store.get("old.pdf").await, Err(StorageError::Expired(_))));
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(!dir.path().join("old.pdf").exists());
        assert!(matches!(store.get("old.pdf").await, Err(StorageError::NotFound(_))));
        assert!(store.get("new.pdf").await.is_ok());
    }

    #[tokio::test]
    async fn test_rejects_path_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::open(dir.path()).await.unwrap();
        for key in ["../x.pdf", "a/b.pdf", METADATA_FILE, ""] {
            assert!(matches!(
                store.put(key, vec![1], PDF, Duration::hours(1)).await,
                Err(StorageError::InvalidKey(_))
            ));
        }
    }
}
