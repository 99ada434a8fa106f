//! Storage Abstraction
//!
//! Key-value blob storage for attachment bytes. Backends implement the
//! minimal [`Storage`] contract; per-object metadata is an optional
//! capability exposed through [`Storage::metadata_support`].

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use oa_core::config::{StorageBackend, StorageConfig};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Writable stream into a storage object
pub type BlobWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Per-object metadata, e.g. `contentType`
pub type ObjectMetadata = HashMap<String, String>;

/// Storage trait - unified interface for storage backends
#[async_trait]
pub trait Storage: Send + Sync {
    /// Check if key exists
    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Delete data by key
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Retrieve data by key
    async fn get(&self, key: &str) -> StorageResult<Bytes>;

    /// Store a whole object at once, returning its size
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64>;

    /// Open a write stream for a key, creating or truncating the object.
    /// The object is complete once the stream has been shut down.
    async fn create_write_stream(&self, key: &str) -> StorageResult<BlobWriter>;

    /// Metadata capability, when the backend supports it
    fn metadata_support(&self) -> Option<&dyn MetadataSupport> {
        None
    }

    /// Get storage name for logging
    fn name(&self) -> &str;
}

/// Backends that can tag objects with metadata
#[async_trait]
pub trait MetadataSupport: Send + Sync {
    async fn set_metadata(&self, key: &str, metadata: ObjectMetadata) -> StorageResult<()>;

    async fn get_metadata(&self, key: &str) -> StorageResult<ObjectMetadata>;
}

/// Local filesystem storage
pub struct LocalStorage {
    /// Root directory for storage
    root: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a key to a full path
    fn resolve_path(&self, key: &str) -> StorageResult<PathBuf> {
        // Prevent directory traversal
        if key.is_empty() || key.contains("..") || key.starts_with('/') || key.starts_with('\\') {
            return Err(StorageError::InvalidPath(key.to_string()));
        }

        Ok(self.root.join(key))
    }

    /// Ensure parent directory exists
    async fn ensure_parent(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.resolve_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.resolve_path(key)?;

        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
            debug!(path = ?path, "File deleted");
        }

        Ok(())
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.resolve_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, data), fields(storage = "local"))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;

        let size = data.len() as u64;
        debug!(path = ?path, size, "File stored");
        Ok(size)
    }

    #[instrument(skip(self), fields(storage = "local"))]
    async fn create_write_stream(&self, key: &str) -> StorageResult<BlobWriter> {
        let path = self.resolve_path(key)?;
        self.ensure_parent(&path).await?;

        let file = fs::File::create(&path).await?;
        debug!(path = ?path, "Write stream opened");

        Ok(Box::pin(file))
    }

    fn name(&self) -> &str {
        "local"
    }
}

type BlobMap = Arc<RwLock<HashMap<String, Vec<u8>>>>;

/// In-memory storage for testing
#[derive(Default)]
pub struct MemoryStorage {
    blobs: BlobMap,
    metadata: RwLock<HashMap<String, ObjectMetadata>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.blobs.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.blobs.write().remove(key);
        self.metadata.write().remove(key);
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        self.blobs
            .read()
            .get(key)
            .map(|data| Bytes::copy_from_slice(data))
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Bytes) -> StorageResult<u64> {
        let size = data.len() as u64;
        self.blobs.write().insert(key.to_string(), data.to_vec());
        Ok(size)
    }

    async fn create_write_stream(&self, key: &str) -> StorageResult<BlobWriter> {
        self.blobs.write().insert(key.to_string(), Vec::new());

        Ok(Box::pin(MemoryBlobWriter {
            blobs: Arc::clone(&self.blobs),
            key: key.to_string(),
        }))
    }

    fn metadata_support(&self) -> Option<&dyn MetadataSupport> {
        Some(self)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl MetadataSupport for MemoryStorage {
    async fn set_metadata(&self, key: &str, metadata: ObjectMetadata) -> StorageResult<()> {
        self.metadata.write().insert(key.to_string(), metadata);
        Ok(())
    }

    async fn get_metadata(&self, key: &str) -> StorageResult<ObjectMetadata> {
        self.metadata
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

/// Appends straight into the shared blob map
struct MemoryBlobWriter {
    blobs: BlobMap,
    key: String,
}

impl AsyncWrite for MemoryBlobWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.blobs
            .write()
            .entry(self.key.clone())
            .or_default()
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// Build the configured storage backend
pub fn build_storage(config: &StorageConfig) -> Arc<dyn Storage> {
    match config.backend {
        StorageBackend::Local => {
            info!(root = %config.local_path, "Using local attachment storage");
            Arc::new(LocalStorage::new(&config.local_path))
        }
        StorageBackend::Memory => {
            info!("Using in-memory attachment storage");
            Arc::new(MemoryStorage::new())
        }
    }
}

/// Generate a fresh storage key for a file with the given extension
pub fn generate_storage_filename(extension: Option<&str>) -> String {
    let token = Uuid::new_v4().simple();

    match extension.filter(|ext| !ext.is_empty()) {
        Some(ext) => format!("{}.{}", token, ext),
        None => token.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_blob(storage: &dyn Storage, key: &str, data: &[u8]) {
        let mut writer = storage.create_write_stream(key).await.unwrap();
        writer.write_all(data).await.unwrap();
        writer.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_storage_write_get() {
        let storage = MemoryStorage::new();
        write_blob(&storage, "test.txt", b"Hello, World!").await;

        let retrieved = storage.get("test.txt").await.unwrap();
        assert_eq!(retrieved, Bytes::from("Hello, World!"));
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_storage_truncates_on_reopen() {
        let storage = MemoryStorage::new();
        write_blob(&storage, "test.txt", b"a much longer first version").await;
        write_blob(&storage, "test.txt", b"short").await;

        assert_eq!(storage.get("test.txt").await.unwrap(), Bytes::from("short"));
    }

    #[tokio::test]
    async fn test_memory_storage_delete() {
        let storage = MemoryStorage::new();
        write_blob(&storage, "test.txt", b"test data").await;
        assert!(storage.exists("test.txt").await.unwrap());

        storage.delete("test.txt").await.unwrap();
        assert!(!storage.exists("test.txt").await.unwrap());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_memory_storage_not_found() {
        let storage = MemoryStorage::new();

        let result = storage.get("nonexistent.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_memory_storage_metadata() {
        let storage = MemoryStorage::new();
        let meta = storage.metadata_support().expect("memory storage supports metadata");

        let mut tags = ObjectMetadata::new();
        tags.insert("contentType".to_string(), "image/png".to_string());
        meta.set_metadata("logo.png", tags).await.unwrap();

        let stored = meta.get_metadata("logo.png").await.unwrap();
        assert_eq!(stored.get("contentType").map(String::as_str), Some("image/png"));
    }

    #[tokio::test]
    async fn test_local_storage_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        write_blob(&storage, "nested/dir/file.bin", &[1, 2, 3]).await;
        assert!(storage.exists("nested/dir/file.bin").await.unwrap());
        assert_eq!(
            storage.get("nested/dir/file.bin").await.unwrap(),
            Bytes::from_static(&[1, 2, 3])
        );
        assert!(storage.metadata_support().is_none());

        storage.delete("nested/dir/file.bin").await.unwrap();
        assert!(!storage.exists("nested/dir/file.bin").await.unwrap());
        // Deleting a missing key is not an error
        storage.delete("nested/dir/file.bin").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_replaces_object() {
        let dir = tempfile::tempdir().unwrap();
        let local = LocalStorage::new(dir.path());
        let memory = MemoryStorage::new();

        for storage in [&local as &dyn Storage, &memory] {
            write_blob(storage, "doc.txt", b"streamed").await;
            let size = storage.put("doc.txt", Bytes::from_static(b"put")).await.unwrap();

            assert_eq!(size, 3);
            assert_eq!(storage.get("doc.txt").await.unwrap(), Bytes::from_static(b"put"));
        }
    }

    #[tokio::test]
    async fn test_local_storage_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let result = storage.get("missing.txt").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_generate_storage_filename() {
        let filename = generate_storage_filename(Some("xlsx"));
        assert!(filename.ends_with(".xlsx"));
        assert_eq!(filename.len(), 32 + ".xlsx".len());
        assert_ne!(filename, generate_storage_filename(Some("xlsx")));

        let no_ext = generate_storage_filename(None);
        assert!(!no_ext.contains('.'));
        assert_eq!(generate_storage_filename(Some("")).len(), 32);
    }

    #[test]
    fn test_build_storage() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            local_path: String::new(),
        };
        assert_eq!(build_storage(&config).name(), "memory");

        let config = StorageConfig {
            backend: StorageBackend::Local,
            local_path: "/tmp/attachments".to_string(),
        };
        assert_eq!(build_storage(&config).name(), "local");
    }

    #[tokio::test]
    async fn test_local_storage_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.create_write_stream("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }
}
