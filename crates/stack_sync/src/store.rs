use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::document::HabitDocument;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("habit document could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("store scan failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("store rejected the write: {0}")]
    Rejected(String),
}

/// The document store behind the habit chain. Loads are whole-collection
/// and unordered; writes are per record.
#[async_trait]
pub trait HabitStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<HabitDocument>, StoreError>;

    /// Upsert by id.
    async fn put(&self, document: &HabitDocument) -> Result<(), StoreError>;

    /// Removing an id the store does not hold succeeds.
    async fn remove(&self, id: &str) -> Result<(), StoreError>;
}

/// In-process store, mostly for tests and offline sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<String, HabitDocument>>,
    reject_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = HabitDocument>) -> Self {
        let store = Self::new();
        {
            let mut guard = store.documents.write();
            for doc in documents {
                guard.insert(doc.id.clone(), doc);
            }
        }
        store
    }

    /// Makes every later `put`/`remove` fail, to simulate an unreachable backend.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    pub fn get(&self, id: &str) -> Option<HabitDocument> {
        self.documents.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Rejected("memory store is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl HabitStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<HabitDocument>, StoreError> {
        Ok(self.documents.read().values().cloned().collect())
    }

    async fn put(&self, document: &HabitDocument) -> Result<(), StoreError> {
        self.check_writable()?;
        self.documents
            .write()
            .insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        self.documents.write().remove(id);
        Ok(())
    }
}
