//! Per-group symmetric key history.
//!
//! Append-only per group: a key is added when the group is created and each
//! time a member is removed, so files written after a removal use a key the
//! removed member never received. Old versions stay available to current
//! members for reading older files.

use std::collections::HashMap;

use sharevault_crypto::GroupKey;
use sharevault_proto::messages::KeyIndex;

/// Versioned key history for every group.
#[derive(Debug, Default, Clone)]
pub struct KeyRing {
    keys: HashMap<String, Vec<GroupKey>>,
}

impl KeyRing {
    /// Empty key ring.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `key` as the newest version for `group`. Returns its version.
    pub fn rotate(&mut self, group: &str, key: GroupKey) -> usize {
        let history = self.keys.entry(group.to_string()).or_default();
        history.push(key);
        history.len() - 1
    }

    /// Key at `index` and its resolved version.
    pub fn get(&self, group: &str, index: KeyIndex) -> Option<(&GroupKey, usize)> {
        let history = self.keys.get(group)?;
        let version = match index {
            KeyIndex::Latest => history.len().checked_sub(1)?,
            KeyIndex::At(v) => v,
        };
        history.get(version).map(|key| (key, version))
    }

    /// Number of versions held for `group`.
    pub fn versions(&self, group: &str) -> usize {
        self.keys.get(group).map_or(0, Vec::len)
    }

    /// Drop the whole history of `group`.
    pub fn retire(&mut self, group: &str) {
        self.keys.remove(group);
    }

    /// Replace the history of `group` (restoring from storage).
    pub fn restore(&mut self, group: &str, history: Vec<GroupKey>) {
        if history.is_empty() {
            self.keys.remove(group);
        } else {
            self.keys.insert(group.to_string(), history);
        }
    }

    /// Iterate over every group's history.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[GroupKey])> {
        self.keys.iter().map(|(group, history)| (group.as_str(), history.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(b: u8) -> GroupKey {
        GroupKey::from_bytes([b; 16])
    }

    #[test]
    fn latest_tracks_last_rotation() {
        let mut ring = KeyRing::new();
        assert_eq!(ring.rotate("eng", key(1)), 0);
        assert_eq!(ring.rotate("eng", key(2)), 1);

        let (latest, version) = ring.get("eng", KeyIndex::Latest).unwrap();
        assert_eq!(version, 1);
        assert_eq!(latest, &key(2));

        let (first, version) = ring.get("eng", KeyIndex::At(0)).unwrap();
        assert_eq!(version, 0);
        assert_eq!(first, &key(1));
    }

    #[test]
    fn out_of_range_and_unknown_groups() {
        let mut ring = KeyRing::new();
        ring.rotate("eng", key(1));
        assert!(ring.get("eng", KeyIndex::At(1)).is_none());
        assert!(ring.get("ops", KeyIndex::Latest).is_none());
        assert_eq!(ring.versions("ops"), 0);
    }

    #[test]
    fn retire_starts_a_fresh_history() {
        let mut ring = KeyRing::new();
        ring.rotate("eng", key(1));
        ring.rotate("eng", key(2));
        ring.retire("eng");
        assert_eq!(ring.versions("eng"), 0);
        assert_eq!(ring.rotate("eng", key(3)), 0);
    }
}
