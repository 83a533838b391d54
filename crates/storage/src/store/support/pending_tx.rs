#![forbid(unsafe_code)]

use super::super::StoreError;
use super::{query_lookup, settle};
use gv_core::ids::{ActorId, BranchId, ChangeId};
use rusqlite::{Connection, params};

/// Raw slot contents for the pair, sentinel included.
pub(in crate::store) fn pending_slot(
    conn: &Connection,
    actor_id: &ActorId,
    branch_id: BranchId,
) -> Result<Option<ChangeId>, StoreError> {
    let lookup = query_lookup(
        conn,
        "SELECT change_id FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2",
        params![actor_id.as_str(), branch_id.get()],
        |row| row.get::<_, i64>(0),
    )?;
    Ok(settle(lookup, "gv_pending_changes by actor and branch").map(ChangeId::new))
}

/// The actor's allocated pending change on the branch, or `Validation`.
pub(in crate::store) fn require_pending(
    conn: &Connection,
    actor_id: &ActorId,
    branch_id: BranchId,
) -> Result<ChangeId, StoreError> {
    match pending_slot(conn, actor_id, branch_id)? {
        Some(change_id) if !change_id.is_sentinel() => Ok(change_id),
        _ => Err(StoreError::Validation(
            "no pending change for this actor on this branch",
        )),
    }
}

pub(in crate::store) fn insert_sentinel_slot(
    conn: &Connection,
    actor_id: &ActorId,
    branch_id: BranchId,
    now_ms: i64,
) -> rusqlite::Result<usize> {
    conn.execute(
        "INSERT INTO gv_pending_changes(actor_id, branch_id, change_id, created_at_ms) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            actor_id.as_str(),
            branch_id.get(),
            ChangeId::SENTINEL.get(),
            now_ms
        ],
    )
}

/// Points a reserved slot at `change_id`. Zero means the slot no longer holds
/// the sentinel.
pub(in crate::store) fn swap_sentinel(
    conn: &Connection,
    actor_id: &ActorId,
    branch_id: BranchId,
    change_id: ChangeId,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "UPDATE gv_pending_changes SET change_id=?3 \
         WHERE actor_id=?1 AND branch_id=?2 AND change_id=?4",
        params![
            actor_id.as_str(),
            branch_id.get(),
            change_id.get(),
            ChangeId::SENTINEL.get()
        ],
    )?)
}

pub(in crate::store) fn release_sentinel(
    conn: &Connection,
    actor_id: &ActorId,
    branch_id: BranchId,
) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2 AND change_id=?3",
        params![
            actor_id.as_str(),
            branch_id.get(),
            ChangeId::SENTINEL.get()
        ],
    )?)
}
