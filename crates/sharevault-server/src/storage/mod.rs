//! Persistence for the group directory and the file index.
//!
//! The trait is synchronous: every call is a short transaction, made from a
//! connection task or the autosave task without holding any engine lock.

mod error;
mod memory;
mod redb;

pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use sharevault_core::DirectorySnapshot;

pub use self::redb::RedbStorage;

/// Index entry for one shared file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// User who uploaded the file
    pub owner: String,
    /// Group the file is shared with
    pub group: String,
}

/// Durable state for both servers.
///
/// Must be Clone (shared by every connection task and the autosave task),
/// Send + Sync, and synchronous. Implementations share internal state via
/// Arc, so clones access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Replace the stored directory with `snapshot` in one transaction.
    fn save_directory(&self, snapshot: &DirectorySnapshot) -> Result<(), StorageError>;

    /// Load the stored directory. Empty if nothing was ever saved.
    fn load_directory(&self) -> Result<DirectorySnapshot, StorageError>;

    /// Add a file to the index.
    ///
    /// Returns `false` without changes if `path` is already indexed.
    fn insert_file(&self, path: &str, record: &FileRecord) -> Result<bool, StorageError>;

    /// Index entry for `path`.
    fn load_file(&self, path: &str) -> Result<Option<FileRecord>, StorageError>;

    /// Remove `path` from the index. Returns `false` if it was not indexed.
    fn remove_file(&self, path: &str) -> Result<bool, StorageError>;

    /// Every indexed file, ordered by path.
    fn list_files(&self) -> Result<Vec<(String, FileRecord)>, StorageError>;
}
