#![forbid(unsafe_code)]

use super::super::StoreError;
use super::views::{ResolvedView, active_items_sql};
use super::{query_lookup, settle};
use gv_core::ids::{
    ActorId, BranchHistoryId, BranchId, ChangeId, ChangeVersionId, ItemId, ItemVersionId,
    ProjectId,
};
use gv_core::{ChangeRow, VersionRef};
use rusqlite::{Connection, OptionalExtension, named_params, params};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(in crate::store) struct ChangeState {
    pub branch_id: BranchId,
    pub committed: bool,
}

pub(in crate::store) fn insert_project(
    conn: &Connection,
    now_ms: i64,
) -> Result<ProjectId, StoreError> {
    conn.execute(
        "INSERT INTO gv_projects(created_at_ms) VALUES (?1)",
        params![now_ms],
    )?;
    Ok(ProjectId::new(conn.last_insert_rowid()))
}

pub(in crate::store) fn project_exists(
    conn: &Connection,
    project_id: ProjectId,
) -> Result<bool, StoreError> {
    Ok(conn
        .query_row(
            "SELECT 1 FROM gv_projects WHERE id=?1",
            params![project_id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some())
}

pub(in crate::store) fn insert_branch(
    conn: &Connection,
    project_id: ProjectId,
    parent_branch_id: Option<BranchId>,
    now_ms: i64,
) -> Result<BranchId, StoreError> {
    if !project_exists(conn, project_id)? {
        return Err(StoreError::NotFound("unknown project id"));
    }
    if let Some(parent) = parent_branch_id {
        match branch_project(conn, parent)? {
            None => return Err(StoreError::NotFound("unknown parent branch id")),
            Some(parent_project) if parent_project != project_id => {
                return Err(StoreError::Validation(
                    "parent branch belongs to another project",
                ));
            }
            Some(_) => {}
        }
    }

    conn.execute(
        "INSERT INTO gv_branches(project_id, parent_branch_id, created_at_ms) VALUES (?1, ?2, ?3)",
        params![
            project_id.get(),
            parent_branch_id.map(BranchId::get),
            now_ms
        ],
    )?;
    Ok(BranchId::new(conn.last_insert_rowid()))
}

pub(in crate::store) fn branch_project(
    conn: &Connection,
    branch_id: BranchId,
) -> Result<Option<ProjectId>, StoreError> {
    Ok(conn
        .query_row(
            "SELECT project_id FROM gv_branches WHERE id=?1",
            params![branch_id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .map(ProjectId::new))
}

pub(in crate::store) fn ensure_branch(
    conn: &Connection,
    branch_id: BranchId,
) -> Result<(), StoreError> {
    match branch_project(conn, branch_id)? {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound("unknown branch id")),
    }
}

pub(in crate::store) fn insert_item(conn: &Connection, now_ms: i64) -> Result<ItemId, StoreError> {
    conn.execute(
        "INSERT INTO gv_items(created_at_ms) VALUES (?1)",
        params![now_ms],
    )?;
    Ok(ItemId::new(conn.last_insert_rowid()))
}

fn ensure_item(conn: &Connection, item_id: ItemId) -> Result<(), StoreError> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM gv_items WHERE id=?1",
            params![item_id.get()],
            |row| row.get::<_, i64>(0),
        )
        .optional()?
        .is_some();
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound("unknown item id"))
    }
}

/// The sentinel row has no branch, so it never resolves here.
pub(in crate::store) fn change_state(
    conn: &Connection,
    change_id: ChangeId,
) -> Result<ChangeState, StoreError> {
    let lookup = query_lookup(
        conn,
        "SELECT branch_id, committed FROM gv_changes WHERE id=?1 AND branch_id IS NOT NULL",
        params![change_id.get()],
        |row| {
            Ok(ChangeState {
                branch_id: BranchId::new(row.get(0)?),
                committed: row.get::<_, i64>(1)? == 1,
            })
        },
    )?;
    settle(lookup, "gv_changes by id").ok_or(StoreError::NotFound("unknown change id"))
}

pub(in crate::store) fn ensure_pending_change(
    conn: &Connection,
    change_id: ChangeId,
    message: &'static str,
) -> Result<ChangeState, StoreError> {
    let state = change_state(conn, change_id)?;
    if state.committed {
        return Err(StoreError::InvalidState(message));
    }
    Ok(state)
}

pub(in crate::store) fn insert_change(
    conn: &Connection,
    branch_id: BranchId,
    actor_id: &ActorId,
    now_ms: i64,
) -> Result<ChangeId, StoreError> {
    ensure_branch(conn, branch_id)?;
    conn.execute(
        "INSERT INTO gv_changes(branch_id, actor_id, committed, created_at_ms) \
         VALUES (?1, ?2, 0, ?3)",
        params![branch_id.get(), actor_id.as_str(), now_ms],
    )?;
    Ok(ChangeId::new(conn.last_insert_rowid()))
}

/// Writes a new immutable version of `item_id` into a pending change.
///
/// An item holds at most one membership per change: a second write to the same
/// pending change supersedes the first.
pub(in crate::store) fn add_item_version(
    conn: &Connection,
    item_id: ItemId,
    change_id: ChangeId,
    deleted: bool,
    now_ms: i64,
) -> Result<VersionRef, StoreError> {
    ensure_pending_change(conn, change_id, "can only add items to pending changes")?;
    ensure_item(conn, item_id)?;

    let superseded = conn.execute(
        "DELETE FROM gv_change_versions WHERE change_id=?1 AND item_id=?2",
        params![change_id.get(), item_id.get()],
    )?;
    if superseded > 0 {
        tracing::debug!(%item_id, %change_id, "superseding earlier membership in pending change");
    }

    conn.execute(
        "INSERT INTO gv_item_versions(item_id, alive, created_at_ms) VALUES (?1, ?2, ?3)",
        params![item_id.get(), if deleted { 0i64 } else { 1i64 }, now_ms],
    )?;
    let item_version_id = ItemVersionId::new(conn.last_insert_rowid());

    conn.execute(
        "INSERT INTO gv_change_versions(item_version_id, item_id, change_id, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4)",
        params![item_version_id.get(), item_id.get(), change_id.get(), now_ms],
    )?;
    let change_version_id = ChangeVersionId::new(conn.last_insert_rowid());

    Ok(VersionRef {
        item_id,
        item_version_id,
        change_version_id,
    })
}

pub(in crate::store) fn commit_change(
    conn: &Connection,
    change_id: ChangeId,
    actor_id: &ActorId,
    now_ms: i64,
) -> Result<ChangeId, StoreError> {
    let updated = conn.execute(
        "UPDATE gv_changes SET committed=1, committed_by=?2, committed_at_ms=?3 \
         WHERE id=?1 AND committed=0 AND branch_id IS NOT NULL",
        params![change_id.get(), actor_id.as_str(), now_ms],
    )?;
    match updated {
        1 => {
            // A committed change never stays in a pending slot.
            conn.execute(
                "DELETE FROM gv_pending_changes WHERE change_id=?1",
                params![change_id.get()],
            )?;
            Ok(change_id)
        }
        0 => {
            // Distinguish unknown from already committed.
            change_state(conn, change_id)?;
            Err(StoreError::InvalidState("change is already committed"))
        }
        _ => {
            tracing::warn!(
                %change_id,
                rows = updated,
                "data integrity: commit touched more than one change"
            );
            Ok(change_id)
        }
    }
}

/// Drops a pending change together with its memberships. The item versions
/// it created stay behind unreferenced; they are immutable.
pub(in crate::store) fn discard_change(
    conn: &Connection,
    change_id: ChangeId,
) -> Result<usize, StoreError> {
    ensure_pending_change(conn, change_id, "cannot discard a committed change")?;
    let memberships = conn.execute(
        "DELETE FROM gv_change_versions WHERE change_id=?1",
        params![change_id.get()],
    )?;
    conn.execute(
        "DELETE FROM gv_changes WHERE id=?1 AND committed=0",
        params![change_id.get()],
    )?;
    Ok(memberships)
}

pub(in crate::store) fn head_change(
    conn: &Connection,
    branch_id: BranchId,
) -> Result<Option<ChangeId>, StoreError> {
    let lookup = query_lookup(
        conn,
        "SELECT change_id FROM gv_branch_heads WHERE branch_id=?1 ORDER BY change_id DESC",
        params![branch_id.get()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(settle(lookup, "gv_branch_heads by branch").map(ChangeId::new))
}

type RawChange = (i64, i64, String, i64, Option<String>, i64, Option<i64>);

pub(in crate::store) const CHANGE_COLUMNS: &str =
    "id, branch_id, actor_id, committed, committed_by, created_at_ms, committed_at_ms";

pub(in crate::store) fn raw_change(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawChange> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

pub(in crate::store) fn change_row(raw: RawChange) -> Result<ChangeRow, StoreError> {
    let (id, branch_id, actor_id, committed, committed_by, created_at_ms, committed_at_ms) = raw;
    let actor_id =
        ActorId::try_new(actor_id).map_err(|_| StoreError::Validation("invalid change row"))?;
    let committed_by = committed_by
        .map(ActorId::try_new)
        .transpose()
        .map_err(|_| StoreError::Validation("invalid change row"))?;
    Ok(ChangeRow {
        change_id: ChangeId::new(id),
        branch_id: BranchId::new(branch_id),
        actor_id,
        committed: committed == 1,
        committed_by,
        created_at_ms,
        committed_at_ms,
    })
}

pub(in crate::store) fn read_change(
    conn: &Connection,
    change_id: ChangeId,
) -> Result<Option<ChangeRow>, StoreError> {
    let sql = format!(
        "SELECT {CHANGE_COLUMNS} FROM gv_changes WHERE id=?1 AND branch_id IS NOT NULL"
    );
    let lookup = query_lookup(conn, &sql, params![change_id.get()], raw_change)?;
    settle(lookup, "gv_changes by id").map(change_row).transpose()
}

/// Attaches every membership alive in `source_branch_id` as of
/// `source_change_id` (head when `None`) to the pending `target_change_id`.
///
/// Item versions are shared, not duplicated, so item identity survives the
/// fork. Items the target change already holds keep their pending version.
pub(in crate::store) fn fork(
    conn: &Connection,
    actor_id: &ActorId,
    target_branch_id: BranchId,
    source_branch_id: BranchId,
    target_change_id: ChangeId,
    source_change_id: Option<ChangeId>,
    now_ms: i64,
) -> Result<BranchHistoryId, StoreError> {
    ensure_branch(conn, source_branch_id)?;
    let target =
        ensure_pending_change(conn, target_change_id, "can only fork into a pending change")?;
    if target.branch_id != target_branch_id {
        return Err(StoreError::Validation(
            "target change belongs to another branch",
        ));
    }

    let source_change_id = match source_change_id {
        Some(change_id) => {
            let state = change_state(conn, change_id)?;
            if state.branch_id != source_branch_id || !state.committed {
                return Err(StoreError::NotFound(
                    "no committed change with that id on the source branch",
                ));
            }
            change_id
        }
        None => head_change(conn, source_branch_id)?
            .ok_or(StoreError::NotFound("source branch has no committed change"))?,
    };

    conn.execute(
        "INSERT INTO gv_branch_history(actor_id, target_branch_id, source_branch_id, \
         target_change_id, source_change_id, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            actor_id.as_str(),
            target_branch_id.get(),
            source_branch_id.get(),
            target_change_id.get(),
            source_change_id.get(),
            now_ms
        ],
    )?;
    let branch_history_id = BranchHistoryId::new(conn.last_insert_rowid());

    let view = ResolvedView::committed(Some(source_change_id));
    let sql = format!(
        "{} \
         INSERT INTO gv_change_versions(item_version_id, item_id, change_id, created_at_ms) \
         SELECT a.item_version_id, a.item_id, :target, :now FROM active a \
         WHERE NOT EXISTS ( \
           SELECT 1 FROM gv_change_versions t \
           WHERE t.change_id = :target AND t.item_id = a.item_id \
         )",
        active_items_sql()
    );
    let copied = conn.execute(
        &sql,
        named_params! {
            ":branch": source_branch_id.get(),
            ":upto": view.upto_param(),
            ":pending": view.pending_param(),
            ":item": Option::<i64>::None,
            ":target": target_change_id.get(),
            ":now": now_ms,
        },
    )?;

    tracing::debug!(
        %target_branch_id,
        %source_branch_id,
        %target_change_id,
        %source_change_id,
        copied,
        "forked branch snapshot"
    );

    Ok(branch_history_id)
}
