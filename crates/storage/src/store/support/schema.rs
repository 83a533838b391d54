#![forbid(unsafe_code)]

use super::super::{StoreError, now_ms};
use gv_core::ids::ChangeId;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;

pub(in crate::store) const SCHEMA_VERSION: i64 = 1;

const REQUIRED_TABLES: &[&str] = &[
    "gv_schema_state",
    "gv_projects",
    "gv_branches",
    "gv_items",
    "gv_item_versions",
    "gv_changes",
    "gv_change_versions",
    "gv_branch_history",
    "gv_pending_changes",
    "branch_headers",
    "branch_header_versions",
    "branch_tags",
    "item_tags",
    "quip_versions",
];

/// Refuses to run against a database that was written by something else or by
/// an incompatible schema version. An empty database passes.
pub(in crate::store) fn preflight_gate(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
    )?;
    let mut rows = stmt.query([])?;
    let mut tables = BTreeSet::new();
    while let Some(row) = rows.next()? {
        tables.insert(row.get::<_, String>(0)?);
    }

    if tables.is_empty() {
        return Ok(());
    }

    let required: BTreeSet<&str> = REQUIRED_TABLES.iter().copied().collect();
    if tables
        .iter()
        .any(|table| !required.contains(table.as_str()))
    {
        return Err(StoreError::Validation(
            "RESET_REQUIRED: unsupported tables detected",
        ));
    }
    if required.iter().any(|table| !tables.contains(*table)) {
        return Err(StoreError::Validation(
            "RESET_REQUIRED: required table is missing",
        ));
    }

    let version = conn
        .query_row(
            "SELECT schema_version FROM gv_schema_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;

    match version {
        Some(v) if v == SCHEMA_VERSION => Ok(()),
        Some(_) => Err(StoreError::Validation(
            "RESET_REQUIRED: schema version mismatch",
        )),
        None => Err(StoreError::Validation(
            "RESET_REQUIRED: schema state row is missing",
        )),
    }
}

pub(in crate::store) fn install_schema(conn: &Connection) -> Result<(), StoreError> {
    let now_ms = now_ms();

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS gv_schema_state (
          singleton INTEGER PRIMARY KEY CHECK(singleton = 1),
          schema_version INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          updated_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gv_projects (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gv_branches (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          project_id INTEGER NOT NULL,
          parent_branch_id INTEGER,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(project_id) REFERENCES gv_projects(id) ON DELETE CASCADE,
          FOREIGN KEY(parent_branch_id) REFERENCES gv_branches(id) ON DELETE SET NULL,
          CHECK(parent_branch_id IS NULL OR parent_branch_id <> id)
        );

        CREATE INDEX IF NOT EXISTS idx_gv_branches_project
          ON gv_branches(project_id, id);

        CREATE TABLE IF NOT EXISTS gv_items (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          created_at_ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS gv_item_versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          item_id INTEGER NOT NULL,
          alive INTEGER NOT NULL CHECK(alive IN (0, 1)),
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(item_id) REFERENCES gv_items(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_gv_item_versions_item
          ON gv_item_versions(item_id, id);

        -- Row 0 is the pending-slot sentinel; it is the only change without a branch.
        CREATE TABLE IF NOT EXISTS gv_changes (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          branch_id INTEGER,
          actor_id TEXT NOT NULL,
          committed INTEGER NOT NULL DEFAULT 0 CHECK(committed IN (0, 1)),
          committed_by TEXT,
          created_at_ms INTEGER NOT NULL,
          committed_at_ms INTEGER,
          FOREIGN KEY(branch_id) REFERENCES gv_branches(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_gv_changes_branch_committed
          ON gv_changes(branch_id, committed, id);

        CREATE TABLE IF NOT EXISTS gv_change_versions (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          item_version_id INTEGER NOT NULL,
          item_id INTEGER NOT NULL,
          change_id INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          UNIQUE(change_id, item_id),
          FOREIGN KEY(item_version_id) REFERENCES gv_item_versions(id) ON DELETE CASCADE,
          FOREIGN KEY(item_id) REFERENCES gv_items(id) ON DELETE CASCADE,
          FOREIGN KEY(change_id) REFERENCES gv_changes(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_gv_change_versions_item
          ON gv_change_versions(item_id, change_id);

        CREATE TABLE IF NOT EXISTS gv_branch_history (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          actor_id TEXT NOT NULL,
          target_branch_id INTEGER NOT NULL,
          source_branch_id INTEGER NOT NULL,
          target_change_id INTEGER NOT NULL,
          source_change_id INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          FOREIGN KEY(target_branch_id) REFERENCES gv_branches(id) ON DELETE CASCADE,
          FOREIGN KEY(source_branch_id) REFERENCES gv_branches(id) ON DELETE CASCADE,
          FOREIGN KEY(target_change_id) REFERENCES gv_changes(id) ON DELETE CASCADE,
          FOREIGN KEY(source_change_id) REFERENCES gv_changes(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_gv_branch_history_target
          ON gv_branch_history(target_branch_id, id);

        CREATE TABLE IF NOT EXISTS gv_pending_changes (
          actor_id TEXT NOT NULL,
          branch_id INTEGER NOT NULL,
          change_id INTEGER NOT NULL,
          created_at_ms INTEGER NOT NULL,
          PRIMARY KEY(actor_id, branch_id),
          FOREIGN KEY(branch_id) REFERENCES gv_branches(id) ON DELETE CASCADE,
          FOREIGN KEY(change_id) REFERENCES gv_changes(id) ON DELETE CASCADE
        );

        CREATE VIEW IF NOT EXISTS gv_branch_heads AS
          SELECT c.branch_id AS branch_id, c.id AS change_id
          FROM gv_changes c
          WHERE c.committed = 1
            AND NOT EXISTS (
              SELECT 1 FROM gv_changes n
              WHERE n.branch_id = c.branch_id AND n.committed = 1 AND n.id > c.id
            );

        CREATE TABLE IF NOT EXISTS branch_headers (
          branch_id INTEGER PRIMARY KEY,
          item_id INTEGER NOT NULL UNIQUE,
          FOREIGN KEY(branch_id) REFERENCES gv_branches(id) ON DELETE CASCADE,
          FOREIGN KEY(item_id) REFERENCES gv_items(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS branch_header_versions (
          item_version_id INTEGER PRIMARY KEY,
          name TEXT NOT NULL,
          description TEXT NOT NULL,
          FOREIGN KEY(item_version_id) REFERENCES gv_item_versions(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS branch_tags (
          item_id INTEGER PRIMARY KEY,
          name TEXT NOT NULL UNIQUE,
          FOREIGN KEY(item_id) REFERENCES gv_items(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS item_tags (
          item_id INTEGER PRIMARY KEY,
          subject_item_id INTEGER NOT NULL,
          name TEXT NOT NULL,
          UNIQUE(subject_item_id, name),
          FOREIGN KEY(item_id) REFERENCES gv_items(id) ON DELETE CASCADE,
          FOREIGN KEY(subject_item_id) REFERENCES gv_items(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS quip_versions (
          item_version_id INTEGER PRIMARY KEY,
          text TEXT NOT NULL,
          timestamp_ms INTEGER NOT NULL,
          FOREIGN KEY(item_version_id) REFERENCES gv_item_versions(id) ON DELETE CASCADE
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO gv_changes(id, branch_id, actor_id, committed, created_at_ms) \
         VALUES (?1, NULL, '', 0, ?2)",
        params![ChangeId::SENTINEL.get(), now_ms],
    )?;

    conn.execute(
        "INSERT INTO gv_schema_state(singleton, schema_version, created_at_ms, updated_at_ms) \
         VALUES (1, ?1, ?2, ?2) \
         ON CONFLICT(singleton) DO UPDATE SET schema_version=excluded.schema_version, \
         updated_at_ms=excluded.updated_at_ms",
        params![SCHEMA_VERSION, now_ms],
    )?;

    Ok(())
}
