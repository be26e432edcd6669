//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety. A
//! directory save replaces all three directory tables in one transaction, so
//! a crash mid-save leaves the previous snapshot intact.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Serialize, de::DeserializeOwned};
use sharevault_core::{DirectorySnapshot, UserEntry};

use super::{FileRecord, Storage, StorageError};

/// Table: users
/// Key: username
/// Value: CBOR-encoded `UserEntry`
const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Table: groups
/// Key: group name
const GROUPS: TableDefinition<&str, ()> = TableDefinition::new("groups");

/// Table: group_keys
/// Key: group name
/// Value: CBOR-encoded key history, oldest first
const GROUP_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("group_keys");

/// Table: files
/// Key: normalized remote path
/// Value: CBOR-encoded `FileRecord`
const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates tables if they don't exist (USERS, GROUPS, GROUP_KEYS, FILES).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(io)?;

        let txn = db.begin_write().map_err(io)?;
        {
            let _ = txn.open_table(USERS).map_err(io)?;
            let _ = txn.open_table(GROUPS).map_err(io)?;
            let _ = txn.open_table(GROUP_KEYS).map_err(io)?;
            let _ = txn.open_table(FILES).map_err(io)?;
        }
        txn.commit().map_err(io)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl Storage for RedbStorage {
    fn save_directory(&self, snapshot: &DirectorySnapshot) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(io)?;

        txn.delete_table(USERS).map_err(io)?;
        txn.delete_table(GROUPS).map_err(io)?;
        txn.delete_table(GROUP_KEYS).map_err(io)?;
        {
            let mut users = txn.open_table(USERS).map_err(io)?;
            for (name, entry) in &snapshot.users {
                users.insert(name.as_str(), encode(entry)?.as_slice()).map_err(io)?;
            }

            let mut groups = txn.open_table(GROUPS).map_err(io)?;
            for group in &snapshot.groups {
                groups.insert(group.as_str(), ()).map_err(io)?;
            }

            let mut keys = txn.open_table(GROUP_KEYS).map_err(io)?;
            for (group, history) in &snapshot.keys {
                keys.insert(group.as_str(), encode(history)?.as_slice()).map_err(io)?;
            }
        }

        txn.commit().map_err(io)?;
        Ok(())
    }

    fn load_directory(&self) -> Result<DirectorySnapshot, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let mut snapshot = DirectorySnapshot::default();

        let users = txn.open_table(USERS).map_err(io)?;
        for row in users.iter().map_err(io)? {
            let (name, value) = row.map_err(io)?;
            let entry: UserEntry = decode(value.value())?;
            snapshot.users.insert(name.value().to_string(), entry);
        }

        let groups = txn.open_table(GROUPS).map_err(io)?;
        for row in groups.iter().map_err(io)? {
            let (name, _) = row.map_err(io)?;
            snapshot.groups.insert(name.value().to_string());
        }

        let keys = txn.open_table(GROUP_KEYS).map_err(io)?;
        let mut histories = BTreeMap::new();
        for row in keys.iter().map_err(io)? {
            let (group, value) = row.map_err(io)?;
            let history: Vec<[u8; 16]> = decode(value.value())?;
            histories.insert(group.value().to_string(), history);
        }
        snapshot.keys = histories;

        Ok(snapshot)
    }

    fn insert_file(&self, path: &str, record: &FileRecord) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        {
            let mut table = txn.open_table(FILES).map_err(io)?;
            if table.get(path).map_err(io)?.is_some() {
                return Ok(false);
            }
            table.insert(path, encode(record)?.as_slice()).map_err(io)?;
        }
        txn.commit().map_err(io)?;
        Ok(true)
    }

    fn load_file(&self, path: &str) -> Result<Option<FileRecord>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(FILES).map_err(io)?;

        match table.get(path).map_err(io)? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn remove_file(&self, path: &str) -> Result<bool, StorageError> {
        let txn = self.db.begin_write().map_err(io)?;
        let removed = {
            let mut table = txn.open_table(FILES).map_err(io)?;
            table.remove(path).map_err(io)?.is_some()
        };
        txn.commit().map_err(io)?;
        Ok(removed)
    }

    fn list_files(&self) -> Result<Vec<(String, FileRecord)>, StorageError> {
        let txn = self.db.begin_read().map_err(io)?;
        let table = txn.open_table(FILES).map_err(io)?;

        let mut files = Vec::new();
        for row in table.iter().map_err(io)? {
            let (path, value) = row.map_err(io)?;
            files.push((path.value().to_string(), decode(value.value())?));
        }
        Ok(files)
    }
}

fn io(err: impl std::fmt::Display) -> StorageError {
    StorageError::Io(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
