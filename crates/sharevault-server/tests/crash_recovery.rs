//! Crash recovery tests for `RedbStorage`.
//!
//! These tests verify that the directory and the file index persist across
//! database close/reopen cycles, simulating server restarts.

use std::collections::BTreeSet;

use sharevault_core::{DirectorySnapshot, UserEntry};
use sharevault_server::storage::{FileRecord, RedbStorage, Storage};
use tempfile::tempdir;

fn entry(groups: &[&str], owned: &[&str]) -> UserEntry {
    UserEntry {
        salt: [0x11; sharevault_crypto::password::SALT_LEN],
        digest: [0x22; sharevault_crypto::password::DIGEST_LEN],
        groups: groups.iter().map(ToString::to_string).collect(),
        owned: owned.iter().map(ToString::to_string).collect(),
    }
}

fn sample_directory() -> DirectorySnapshot {
    let mut snapshot = DirectorySnapshot::default();
    snapshot.users.insert("root".into(), entry(&["ADMIN", "team"], &["ADMIN", "team"]));
    snapshot.users.insert("alice".into(), entry(&["team"], &[]));
    snapshot.groups = ["ADMIN", "team"].into_iter().map(String::from).collect::<BTreeSet<_>>();
    snapshot.keys.insert("ADMIN".into(), vec![[1; 16]]);
    snapshot.keys.insert("team".into(), vec![[2; 16], [3; 16]]);
    snapshot
}

#[test]
fn directory_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("group.redb");
    let snapshot = sample_directory();

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        storage.save_directory(&snapshot).unwrap();
        // Database dropped
    }

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        let loaded = storage.load_directory().unwrap();
        assert_eq!(loaded, snapshot);
        assert_eq!(loaded.keys["team"], vec![[2; 16], [3; 16]]);
    }
}

#[test]
fn save_replaces_previous_directory() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("group.redb");

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        storage.save_directory(&sample_directory()).unwrap();

        let mut smaller = sample_directory();
        smaller.users.remove("alice");
        smaller.groups.remove("team");
        smaller.keys.remove("team");
        storage.save_directory(&smaller).unwrap();
    }

    let storage = RedbStorage::open(&db_path).unwrap();
    let loaded = storage.load_directory().unwrap();
    assert!(!loaded.users.contains_key("alice"));
    assert!(!loaded.groups.contains("team"));
    assert!(!loaded.keys.contains_key("team"));
    assert_eq!(loaded.users.len(), 1);
}

#[test]
fn fresh_database_is_empty() {
    let dir = tempdir().unwrap();
    let storage = RedbStorage::open(dir.path().join("fresh.redb")).unwrap();

    assert!(storage.load_directory().unwrap().is_empty());
    assert!(storage.list_files().unwrap().is_empty());
}

#[test]
fn file_index_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("files.redb");
    let record = FileRecord { owner: "alice".into(), group: "team".into() };

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        assert!(storage.insert_file("docs/plan.txt", &record).unwrap());
        assert!(storage.insert_file("notes.md", &record).unwrap());
        assert!(storage.remove_file("notes.md").unwrap());
    }

    {
        let storage = RedbStorage::open(&db_path).unwrap();
        assert_eq!(storage.load_file("docs/plan.txt").unwrap(), Some(record.clone()));
        assert_eq!(storage.load_file("notes.md").unwrap(), None);
        assert_eq!(storage.list_files().unwrap(), vec![("docs/plan.txt".to_string(), record)]);
    }
}

#[test]
fn insert_refuses_existing_path() {
    let dir = tempdir().unwrap();
    let storage = RedbStorage::open(dir.path().join("files.redb")).unwrap();
    let first = FileRecord { owner: "alice".into(), group: "team".into() };
    let second = FileRecord { owner: "bob".into(), group: "other".into() };

    assert!(storage.insert_file("a.txt", &first).unwrap());
    assert!(!storage.insert_file("a.txt", &second).unwrap());
    assert_eq!(storage.load_file("a.txt").unwrap(), Some(first));
    assert!(!storage.remove_file("missing.txt").unwrap());
}
