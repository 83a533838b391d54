#![forbid(unsafe_code)]

use super::support::revision_tx;
use super::{ForkBranchRequest, SqliteStore, StoreError, now_ms, to_sqlite_i64};
use gv_core::ids::{ActorId, BranchHistoryId, BranchId, ChangeId, ItemId, ProjectId};
use gv_core::{BranchHistoryRow, ChangeRow, Page, VersionRef};
use rusqlite::params;

impl SqliteStore {
    /// Projects only scope branches for the caller; the engine never reads them
    /// otherwise.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn create_project(&mut self) -> Result<ProjectId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let project_id = revision_tx::insert_project(&tx, now_ms)?;
        tx.commit()?;
        Ok(project_id)
    }

    /// Removes the project and, by cascade, its branches, changes, pending
    /// slots and fork records. Returns whether anything was deleted.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn delete_project(&mut self, project_id: ProjectId) -> Result<bool, StoreError> {
        let tx = self.write_tx()?;
        let deleted = tx.execute(
            "DELETE FROM gv_projects WHERE id=?1",
            params![project_id.get()],
        )?;
        tx.commit()?;
        Ok(deleted > 0)
    }

    /// Creates a branch row and nothing else: no header, no history. Most
    /// callers want [`SqliteStore::create_branch`].
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn create_bare_branch(
        &mut self,
        project_id: ProjectId,
        parent_branch_id: Option<BranchId>,
    ) -> Result<BranchId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let branch_id = revision_tx::insert_branch(&tx, project_id, parent_branch_id, now_ms)?;
        tx.commit()?;
        Ok(branch_id)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn create_item(&mut self) -> Result<ItemId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let item_id = revision_tx::insert_item(&tx, now_ms)?;
        tx.commit()?;
        Ok(item_id)
    }

    /// Records a new version of `item_id` (a tombstone when `deleted`) inside
    /// the pending `change_id`.
    ///
    /// Fails with `InvalidState` once the change is committed. An item already
    /// present in the change has that membership replaced.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn add_item_to_change(
        &mut self,
        item_id: ItemId,
        change_id: ChangeId,
        deleted: bool,
    ) -> Result<VersionRef, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let version = revision_tx::add_item_version(&tx, item_id, change_id, deleted, now_ms)?;
        tx.commit()?;
        Ok(version)
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn create_change(
        &mut self,
        branch_id: BranchId,
        actor_id: &ActorId,
    ) -> Result<ChangeId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let change_id = revision_tx::insert_change(&tx, branch_id, actor_id, now_ms)?;
        tx.commit()?;
        Ok(change_id)
    }

    /// Commits a pending change. A pending slot still pointing at it is
    /// closed in the same transaction.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn commit_change(
        &mut self,
        change_id: ChangeId,
        actor_id: &ActorId,
    ) -> Result<ChangeId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let committed = revision_tx::commit_change(&tx, change_id, actor_id, now_ms)?;
        tx.commit()?;
        tracing::debug!(%change_id, %actor_id, "committed change");
        Ok(committed)
    }

    /// `NotFound` for an unknown id. Note this tells the caller whether the id
    /// exists at all.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn is_change_committed(&self, change_id: ChangeId) -> Result<bool, StoreError> {
        Ok(revision_tx::change_state(&self.conn, change_id)?.committed)
    }

    /// Deletes a pending change and its memberships.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn discard_change(&mut self, change_id: ChangeId) -> Result<(), StoreError> {
        let tx = self.write_tx()?;
        let memberships = revision_tx::discard_change(&tx, change_id)?;
        tx.commit()?;
        tracing::debug!(%change_id, memberships, "discarded change");
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn change(&self, change_id: ChangeId) -> Result<Option<ChangeRow>, StoreError> {
        revision_tx::read_change(&self.conn, change_id)
    }

    /// Copies the source branch's snapshot into a pending change on the target
    /// branch and records the fork. See [`ForkBranchRequest`].
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn fork_branch(
        &mut self,
        request: ForkBranchRequest,
    ) -> Result<BranchHistoryId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let branch_history_id = revision_tx::fork(
            &tx,
            &request.actor_id,
            request.target_branch_id,
            request.source_branch_id,
            request.target_change_id,
            request.source_change_id,
            now_ms,
        )?;
        tx.commit()?;
        Ok(branch_history_id)
    }

    /// Fork records whose target is `branch_id`, oldest first.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn branch_history(
        &self,
        branch_id: BranchId,
        page: Page,
    ) -> Result<Vec<BranchHistoryRow>, StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        let mut stmt = self.conn.prepare(
            "SELECT id, actor_id, target_branch_id, source_branch_id, target_change_id, \
             source_change_id, created_at_ms \
             FROM gv_branch_history \
             WHERE target_branch_id=?1 \
             ORDER BY id ASC \
             LIMIT ?2 OFFSET ?3",
        )?;
        let mut rows = stmt.query(params![
            branch_id.get(),
            to_sqlite_i64(page.limit)?,
            to_sqlite_i64(page.offset)?
        ])?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let actor_id = ActorId::try_new(row.get::<_, String>(1)?)
                .map_err(|_| StoreError::Validation("invalid branch history row"))?;
            out.push(BranchHistoryRow {
                branch_history_id: BranchHistoryId::new(row.get(0)?),
                actor_id,
                target_branch_id: BranchId::new(row.get(2)?),
                source_branch_id: BranchId::new(row.get(3)?),
                target_change_id: ChangeId::new(row.get(4)?),
                source_change_id: ChangeId::new(row.get(5)?),
                created_at_ms: row.get(6)?,
            });
        }
        Ok(out)
    }
}
