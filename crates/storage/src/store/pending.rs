#![forbid(unsafe_code)]

use super::support::pending_tx;
use super::support::revision_tx;
use super::{SqliteStore, StoreError, is_uniqueness_violation, now_ms, to_sqlite_i64};
use gv_core::ids::{ActorId, BranchId, ChangeId};
use gv_core::{Page, PendingChangeRow};
use rusqlite::params;

impl SqliteStore {
    /// Opens the actor's pending change on a branch.
    ///
    /// Calling this again for a pair that already has its pending change
    /// returns that change. When another unit of work is between reserving
    /// and allocating the pair's slot, or wins the reservation race, this
    /// fails with `Conflict`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn create_pending_change(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<ChangeId, StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        match pending_tx::pending_slot(&self.conn, actor_id, branch_id)? {
            Some(change_id) if change_id.is_sentinel() => {
                return Err(StoreError::Conflict(
                    "pending change for this actor and branch is being created",
                ));
            }
            Some(change_id) => match revision_tx::change_state(&self.conn, change_id) {
                Ok(state) if !state.committed => return Ok(change_id),
                Ok(_) | Err(StoreError::NotFound(_)) => {
                    self.clear_stale_slot(actor_id, branch_id, change_id)?;
                }
                Err(err) => return Err(err),
            },
            None => {}
        }

        self.reserve_pending_slot(actor_id, branch_id)?;
        match self.allocate_pending_change(actor_id, branch_id) {
            Ok(change_id) => Ok(change_id),
            Err(err @ StoreError::Conflict(_)) => Err(err),
            Err(err) => {
                // Leave the pair creatable again.
                if let Err(release_err) =
                    pending_tx::release_sentinel(&self.conn, actor_id, branch_id)
                {
                    tracing::warn!(
                        %actor_id,
                        %branch_id,
                        error = %release_err,
                        "failed to release pending slot"
                    );
                }
                Err(err)
            }
        }
    }

    /// Drops a slot whose change was committed or is gone, so the pair can
    /// open a fresh pending change.
    fn clear_stale_slot(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
        change_id: ChangeId,
    ) -> Result<(), StoreError> {
        let tx = self.write_tx()?;
        let removed = tx.execute(
            "DELETE FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2 AND change_id=?3",
            params![actor_id.as_str(), branch_id.get(), change_id.get()],
        )?;
        tx.commit()?;
        tracing::warn!(%actor_id, %branch_id, %change_id, removed, "cleared stale pending slot");
        Ok(())
    }

    /// First phase: claims the `(actor, branch)` slot with the sentinel change
    /// id. The slot's primary key is the only arbiter between concurrent
    /// creators; losing the insert is `Conflict`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn reserve_pending_slot(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<(), StoreError> {
        revision_tx::ensure_branch(&self.conn, branch_id)?;
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        match pending_tx::insert_sentinel_slot(&tx, actor_id, branch_id, now_ms) {
            Ok(_) => {}
            Err(err) if is_uniqueness_violation(&err) => {
                return Err(StoreError::Conflict(
                    "pending change already exists for this actor and branch",
                ));
            }
            Err(err) => return Err(err.into()),
        }
        tx.commit()?;
        Ok(())
    }

    /// Second phase: creates the real pending change and points the reserved
    /// slot at it, in one transaction. `Conflict` when the slot no longer holds
    /// the sentinel.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn allocate_pending_change(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<ChangeId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let change_id = revision_tx::insert_change(&tx, branch_id, actor_id, now_ms)?;
        if pending_tx::swap_sentinel(&tx, actor_id, branch_id, change_id)? == 0 {
            return Err(StoreError::Conflict(
                "pending slot is not reserved for this actor and branch",
            ));
        }
        tx.commit()?;
        tracing::debug!(%actor_id, %branch_id, %change_id, "allocated pending change");
        Ok(change_id)
    }

    /// A slot still holding the sentinel reads as `None`.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn pending_change(
        &self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<Option<ChangeId>, StoreError> {
        Ok(pending_tx::pending_slot(&self.conn, actor_id, branch_id)?
            .filter(|change_id| !change_id.is_sentinel()))
    }

    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn count_pending_changes(
        &self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2",
            params![actor_id.as_str(), branch_id.get()],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|_| StoreError::Validation("numeric overflow"))
    }

    /// Branches the actor has allocated pending changes on, by branch id.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn list_pending_changes(
        &self,
        actor_id: &ActorId,
        page: Page,
    ) -> Result<Vec<PendingChangeRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT branch_id, change_id, created_at_ms FROM gv_pending_changes \
             WHERE actor_id=?1 AND change_id<>?2 \
             ORDER BY branch_id ASC \
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt.query_map(
            params![
                actor_id.as_str(),
                ChangeId::SENTINEL.get(),
                to_sqlite_i64(page.limit)?,
                to_sqlite_i64(page.offset)?
            ],
            |row| {
                Ok(PendingChangeRow {
                    actor_id: actor_id.clone(),
                    branch_id: BranchId::new(row.get(0)?),
                    change_id: ChangeId::new(row.get(1)?),
                    created_at_ms: row.get(2)?,
                })
            },
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Commits the actor's pending change and clears the slot, atomically.
    /// `Validation` when the pair has no pending change.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn commit_pending_change(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<ChangeId, StoreError> {
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let change_id = pending_tx::require_pending(&tx, actor_id, branch_id)?;
        revision_tx::commit_change(&tx, change_id, actor_id, now_ms)?;
        tx.execute(
            "DELETE FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2 AND change_id=?3",
            params![actor_id.as_str(), branch_id.get(), change_id.get()],
        )?;
        tx.commit()?;
        tracing::debug!(%actor_id, %branch_id, %change_id, "committed pending change");
        Ok(change_id)
    }

    /// Drops the pair's pending record and discards its uncommitted change.
    /// Returns the number of records removed; zero is fine.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn delete_pending_change(
        &mut self,
        actor_id: &ActorId,
        branch_id: BranchId,
    ) -> Result<usize, StoreError> {
        let tx = self.write_tx()?;
        let change_ids: Vec<ChangeId> = {
            let mut stmt = tx.prepare(
                "SELECT change_id FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2",
            )?;
            let rows = stmt.query_map(params![actor_id.as_str(), branch_id.get()], |row| {
                row.get::<_, i64>(0)
            })?;
            rows.map(|row| row.map(ChangeId::new))
                .collect::<Result<_, _>>()?
        };
        if change_ids.len() > 1 {
            tracing::warn!(
                %actor_id,
                %branch_id,
                row_count = change_ids.len(),
                "data integrity: several pending changes for one actor and branch"
            );
        }

        let removed = tx.execute(
            "DELETE FROM gv_pending_changes WHERE actor_id=?1 AND branch_id=?2",
            params![actor_id.as_str(), branch_id.get()],
        )?;
        for change_id in change_ids {
            if change_id.is_sentinel() {
                continue;
            }
            match revision_tx::change_state(&tx, change_id) {
                Ok(state) if !state.committed => {
                    revision_tx::discard_change(&tx, change_id)?;
                }
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        tx.commit()?;
        tracing::debug!(%actor_id, %branch_id, removed, "deleted pending change");
        Ok(removed)
    }
}
