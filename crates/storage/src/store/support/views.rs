#![forbid(unsafe_code)]

use super::super::StoreError;
use super::revision_tx::{change_state, ensure_branch, head_change};
use gv_core::ids::{BranchId, ChangeId, ItemId, ItemVersionId};
use gv_core::{ActiveItemRow, BranchView};
use rusqlite::{Connection, named_params};

/// A branch view pinned to concrete change ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(in crate::store) struct ResolvedView {
    /// Committed changes up to and including this id are visible.
    pub upto: Option<ChangeId>,
    /// Pending change laid over the committed history; it wins per item.
    pub pending: Option<ChangeId>,
}

impl ResolvedView {
    pub fn committed(upto: Option<ChangeId>) -> Self {
        Self {
            upto,
            pending: None,
        }
    }

    /// Change id the view reports as "current".
    pub fn anchor(&self) -> Option<ChangeId> {
        self.pending.or(self.upto)
    }

    pub fn upto_param(&self) -> i64 {
        self.upto.map_or(-1, ChangeId::get)
    }

    pub fn pending_param(&self) -> i64 {
        self.pending.map_or(-1, ChangeId::get)
    }
}

pub(in crate::store) fn resolve_view(
    conn: &Connection,
    branch_id: BranchId,
    view: BranchView,
) -> Result<ResolvedView, StoreError> {
    ensure_branch(conn, branch_id)?;
    match view {
        BranchView::Head => Ok(ResolvedView::committed(head_change(conn, branch_id)?)),
        BranchView::AsOf(change_id) => {
            let state = change_state(conn, change_id)?;
            if state.branch_id != branch_id || !state.committed {
                return Err(StoreError::NotFound(
                    "no committed change with that id on this branch",
                ));
            }
            Ok(ResolvedView::committed(Some(change_id)))
        }
        BranchView::PendingOverlay(change_id) => {
            let state = change_state(conn, change_id)?;
            if state.branch_id != branch_id {
                return Err(StoreError::NotFound(
                    "no pending change with that id on this branch",
                ));
            }
            if state.committed {
                return Err(StoreError::InvalidState(
                    "overlay requires a pending change",
                ));
            }
            Ok(ResolvedView {
                upto: head_change(conn, branch_id)?,
                pending: Some(change_id),
            })
        }
    }
}

/// `active(item_id, item_version_id, change_id)`: for each item, the newest
/// membership visible in the view, kept only while that version is alive.
///
/// Binds `:branch`, `:upto`, `:pending` and `:item` (NULL for every item).
pub(in crate::store) fn active_items_sql() -> &'static str {
    r#"
    WITH ranked AS (
      SELECT cv.item_id AS item_id,
             cv.item_version_id AS item_version_id,
             cv.change_id AS change_id,
             iv.alive AS alive,
             ROW_NUMBER() OVER (
               PARTITION BY cv.item_id
               ORDER BY (cv.change_id = :pending) DESC, cv.change_id DESC, cv.item_version_id DESC
             ) AS pick
      FROM gv_change_versions cv
      JOIN gv_changes c ON c.id = cv.change_id
      JOIN gv_item_versions iv ON iv.id = cv.item_version_id
      WHERE c.branch_id = :branch
        AND ((c.committed = 1 AND c.id <= :upto) OR c.id = :pending)
        AND (:item IS NULL OR cv.item_id = :item)
    ),
    active AS (
      SELECT item_id, item_version_id, change_id FROM ranked WHERE pick = 1 AND alive = 1
    )
    "#
}

pub(in crate::store) fn active_items(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
    item_id: Option<ItemId>,
) -> Result<Vec<ActiveItemRow>, StoreError> {
    let sql = format!(
        "{} SELECT item_id, item_version_id, change_id FROM active ORDER BY item_id",
        active_items_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows: Vec<ActiveItemRow> = stmt
        .query_map(
            named_params! {
                ":branch": branch_id.get(),
                ":upto": view.upto_param(),
                ":pending": view.pending_param(),
                ":item": item_id.map(ItemId::get),
            },
            |row| {
                Ok(ActiveItemRow {
                    item_id: ItemId::new(row.get(0)?),
                    item_version_id: ItemVersionId::new(row.get(1)?),
                    change_id: ChangeId::new(row.get(2)?),
                })
            },
        )?
        .collect::<Result<_, _>>()?;
    Ok(rows)
}

pub(in crate::store) fn active_item(
    conn: &Connection,
    branch_id: BranchId,
    view: ResolvedView,
    item_id: ItemId,
) -> Result<Option<ActiveItemRow>, StoreError> {
    Ok(active_items(conn, branch_id, view, Some(item_id))?
        .into_iter()
        .next())
}
