#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use sharevault_core::DirectorySnapshot;

use super::{FileRecord, Storage, StorageError};

/// In-memory storage for tests and ephemeral servers.
///
/// Cloning shares the same state.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<MemoryStorageInner>>,
}

#[derive(Default)]
struct MemoryStorageInner {
    directory: DirectorySnapshot,
    files: BTreeMap<String, FileRecord>,
    saves: usize,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed [`Storage::save_directory`] calls.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }

    fn lock(&self) -> MutexGuard<'_, MemoryStorageInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Storage for MemoryStorage {
    fn save_directory(&self, snapshot: &DirectorySnapshot) -> Result<(), StorageError> {
        let mut inner = self.lock();
        inner.directory = snapshot.clone();
        inner.saves += 1;
        Ok(())
    }

    fn load_directory(&self) -> Result<DirectorySnapshot, StorageError> {
        Ok(self.lock().directory.clone())
    }

    fn insert_file(&self, path: &str, record: &FileRecord) -> Result<bool, StorageError> {
        let mut inner = self.lock();
        if inner.files.contains_key(path) {
            return Ok(false);
        }
        inner.files.insert(path.to_string(), record.clone());
        Ok(true)
    }

    fn load_file(&self, path: &str) -> Result<Option<FileRecord>, StorageError> {
        Ok(self.lock().files.get(path).cloned())
    }

    fn remove_file(&self, path: &str) -> Result<bool, StorageError> {
        Ok(self.lock().files.remove(path).is_some())
    }

    fn list_files(&self) -> Result<Vec<(String, FileRecord)>, StorageError> {
        Ok(self.lock().files.iter().map(|(p, r)| (p.clone(), r.clone())).collect())
    }
}
