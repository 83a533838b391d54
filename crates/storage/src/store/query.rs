#![forbid(unsafe_code)]

use super::support::revision_tx::{self, CHANGE_COLUMNS, change_row, raw_change};
use super::support::views::{self, resolve_view};
use super::{SqliteStore, StoreError, to_sqlite_i64};
use gv_core::ids::{BranchId, ChangeId, ChangeVersionId, ItemId, ItemVersionId};
use gv_core::{ActiveItemRow, BranchView, ChangeRow, ChangeVersionRow, Page};
use rusqlite::params;

impl SqliteStore {
    /// Highest committed change on the branch, `None` before the first commit.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn head_change(&self, branch_id: BranchId) -> Result<Option<ChangeId>, StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        revision_tx::head_change(&self.conn, branch_id)
    }

    /// The committed change `change_id` if it belongs to `branch_id`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn change_at(
        &self,
        branch_id: BranchId,
        change_id: ChangeId,
    ) -> Result<Option<ChangeRow>, StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        Ok(revision_tx::read_change(&self.conn, change_id)?
            .filter(|change| change.branch_id == branch_id && change.committed))
    }

    /// Memberships recorded by a committed change, in insertion order.
    /// Tombstones are included with `alive == false`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn items_in_change(
        &self,
        change_id: ChangeId,
        page: Page,
    ) -> Result<Vec<ChangeVersionRow>, StoreError> {
        self.ensure_committed(change_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT cv.id, cv.change_id, cv.item_id, cv.item_version_id, iv.alive, \
             cv.created_at_ms \
             FROM gv_change_versions cv \
             JOIN gv_item_versions iv ON iv.id = cv.item_version_id \
             WHERE cv.change_id=?1 \
             ORDER BY cv.id ASC \
             LIMIT ?2 OFFSET ?3",
        )?;
        let rows = stmt.query_map(
            params![
                change_id.get(),
                to_sqlite_i64(page.limit)?,
                to_sqlite_i64(page.offset)?
            ],
            |row| {
                Ok(ChangeVersionRow {
                    change_version_id: ChangeVersionId::new(row.get(0)?),
                    change_id: ChangeId::new(row.get(1)?),
                    item_id: ItemId::new(row.get(2)?),
                    item_version_id: ItemVersionId::new(row.get(3)?),
                    alive: row.get::<_, i64>(4)? == 1,
                    created_at_ms: row.get(5)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn count_items_in_change(&self, change_id: ChangeId) -> Result<usize, StoreError> {
        self.ensure_committed(change_id)?;
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM gv_change_versions WHERE change_id=?1",
            params![change_id.get()],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|_| StoreError::Validation("numeric overflow"))
    }

    /// Items alive in `view`, one row per item, ordered by item id.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn active_items(
        &self,
        branch_id: BranchId,
        view: BranchView,
    ) -> Result<Vec<ActiveItemRow>, StoreError> {
        let resolved = resolve_view(&self.conn, branch_id, view)?;
        if resolved.anchor().is_none() {
            return Ok(Vec::new());
        }
        views::active_items(&self.conn, branch_id, resolved, None)
    }

    /// The version of `item_id` visible in `view`; `None` when the item is
    /// absent or deleted there.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn item_at(
        &self,
        branch_id: BranchId,
        item_id: ItemId,
        view: BranchView,
    ) -> Result<Option<ActiveItemRow>, StoreError> {
        let resolved = resolve_view(&self.conn, branch_id, view)?;
        views::active_item(&self.conn, branch_id, resolved, item_id)
    }

    /// Committed changes on a branch, newest first. `after` keeps only changes
    /// with a larger ordinal.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn branch_versions(
        &self,
        branch_id: BranchId,
        after: Option<ChangeId>,
        page: Page,
    ) -> Result<Vec<ChangeRow>, StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        let sql = format!(
            "SELECT {CHANGE_COLUMNS} FROM gv_changes \
             WHERE branch_id=?1 AND committed=1 AND id > ?2 \
             ORDER BY id DESC \
             LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let raw: Vec<_> = stmt
            .query_map(
                params![
                    branch_id.get(),
                    after.map_or(0, ChangeId::get),
                    to_sqlite_i64(page.limit)?,
                    to_sqlite_i64(page.offset)?
                ],
                raw_change,
            )?
            .collect::<Result<_, _>>()?;
        raw.into_iter().map(change_row).collect()
    }

    fn ensure_committed(&self, change_id: ChangeId) -> Result<(), StoreError> {
        if revision_tx::change_state(&self.conn, change_id)?.committed {
            Ok(())
        } else {
            Err(StoreError::InvalidState(
                "change is still pending; read it through a pending overlay",
            ))
        }
    }
}
