#![forbid(unsafe_code)]

mod common;

use common::{actor, bare_branch};
use gv_storage::{SqliteStore, StoreConfig, StoreError};
use rusqlite::Connection;
use std::time::Duration;

#[test]
fn open_is_fail_closed_on_foreign_tables() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let conn = Connection::open(dir.path().join("groboversion.db")).expect("db must open");
    conn.execute("CREATE TABLE legacy_quips(id TEXT PRIMARY KEY)", [])
        .expect("legacy table should be created");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("foreign schema must be rejected");
    assert_eq!(err.code(), "RESET_REQUIRED");
    assert!(matches!(
        err,
        StoreError::Validation(message) if message.starts_with("RESET_REQUIRED")
    ));
    assert!(!err.is_retryable());
}

#[test]
fn open_rejects_a_newer_schema_version() {
    let dir = tempfile::tempdir().expect("create temp dir");
    drop(SqliteStore::open(dir.path()).expect("fresh store"));

    let conn = Connection::open(dir.path().join("groboversion.db")).expect("db must open");
    conn.execute("UPDATE gv_schema_state SET schema_version = schema_version + 1", [])
        .expect("bump version");
    drop(conn);

    let err = SqliteStore::open(dir.path()).expect_err("version mismatch");
    assert_eq!(err.code(), "RESET_REQUIRED");
}

#[test]
fn reopening_keeps_data_and_config_is_honored() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = StoreConfig::default()
        .with_db_file_name("custom.db")
        .with_busy_timeout(Duration::from_millis(250))
        .with_wal(false);

    let alice = actor("alice");
    let branch_id = {
        let mut store =
            SqliteStore::open_with_config(dir.path(), config.clone()).expect("open store");
        assert_eq!(store.storage_dir(), Some(dir.path()));
        let (_, branch_id) = bare_branch(&mut store);
        let change_id = store.create_change(branch_id, &alice).expect("change");
        store.commit_change(change_id, &alice).expect("commit");
        branch_id
    };
    assert!(dir.path().join("custom.db").exists());

    let store = SqliteStore::open_with_config(dir.path(), config).expect("reopen store");
    assert!(store.head_change(branch_id).expect("head").is_some());
}

#[test]
fn in_memory_store_works_without_a_directory() {
    let mut store = SqliteStore::open_in_memory().expect("in-memory store");
    assert_eq!(store.storage_dir(), None);
    let (_, branch_id) = bare_branch(&mut store);
    let change_id = store
        .create_pending_change(&actor("alice"), branch_id)
        .expect("pending change");
    assert!(!change_id.is_sentinel());
}
