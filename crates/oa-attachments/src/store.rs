//! Stored file records
//!
//! Persistence of [`StoredFile`] belongs to the caller; the manager only
//! needs to save, look up and remove records through this trait.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use oa_core::traits::Id;
use tokio::sync::RwLock;

use crate::error::AttachmentResult;
use crate::model::StoredFile;

/// Stored file record store
#[async_trait]
pub trait FileRecordStore: Send + Sync {
    /// Insert or update a record, assigning an id to new ones
    async fn save(&self, file: &mut StoredFile) -> AttachmentResult<Id>;

    /// Get a record by ID
    async fn get(&self, id: Id) -> AttachmentResult<Option<StoredFile>>;

    /// Remove a record; unsaved records are ignored
    async fn remove(&self, file: &StoredFile) -> AttachmentResult<()>;
}

/// In-memory record store for testing
pub struct MemoryFileStore {
    files: RwLock<Vec<StoredFile>>,
    next_id: AtomicI64,
}

impl Default for MemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.files.read().await.len()
    }
}

#[async_trait]
impl FileRecordStore for MemoryFileStore {
    async fn save(&self, file: &mut StoredFile) -> AttachmentResult<Id> {
        let mut files = self.files.write().await;

        if let Some(id) = file.id {
            if let Some(pos) = files.iter().position(|f| f.id == Some(id)) {
                files[pos] = file.clone();
                return Ok(id);
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        file.id = Some(id);
        files.push(file.clone());

        Ok(id)
    }

    async fn get(&self, id: Id) -> AttachmentResult<Option<StoredFile>> {
        let files = self.files.read().await;
        Ok(files.iter().find(|f| f.id == Some(id)).cloned())
    }

    async fn remove(&self, file: &StoredFile) -> AttachmentResult<()> {
        if let Some(id) = file.id {
            let mut files = self.files.write().await;
            files.retain(|f| f.id != Some(id));
        }
        Ok(())
    }
}
