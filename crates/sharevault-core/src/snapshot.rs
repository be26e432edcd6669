//! Serializable image of the directory state.
//!
//! Produced under the engine's locks and handed to storage. Key bytes are
//! secret, so `Debug` shows only counts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sharevault_crypto::password::{DIGEST_LEN, SALT_LEN};

/// Stored form of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEntry {
    /// Per-user salt
    pub salt: [u8; SALT_LEN],
    /// SHA-256 of salt and password
    pub digest: [u8; DIGEST_LEN],
    /// Group memberships
    pub groups: BTreeSet<String>,
    /// Group ownerships
    pub owned: BTreeSet<String>,
}

/// Complete directory state.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    /// Users by name
    pub users: BTreeMap<String, UserEntry>,
    /// Registered groups
    pub groups: BTreeSet<String>,
    /// Key history per group, oldest first
    pub keys: BTreeMap<String, Vec<[u8; 16]>>,
}

impl DirectorySnapshot {
    /// True if there are no users.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl std::fmt::Debug for DirectorySnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySnapshot")
            .field("users", &self.users.len())
            .field("groups", &self.groups.len())
            .field("key_versions", &self.keys.values().map(Vec::len).sum::<usize>())
            .finish()
    }
}
