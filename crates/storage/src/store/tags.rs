#![forbid(unsafe_code)]

use super::support::tags_tx;
use super::support::views::resolve_view;
use super::{SqliteStore, StoreError, now_ms};
use gv_core::ids::{BranchId, ChangeId, ItemId};
use gv_core::{BranchView, TagPatch, normalize_tags};

/// Whose tag set is being read or reconciled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TagSubject {
    /// Branch header tags. A tag name maps to one Item shared by every branch.
    Branch(BranchId),
    /// Tags on one item as seen from a branch. Each (item, tag name) pair is
    /// its own Item.
    Item { branch_id: BranchId, item_id: ItemId },
}

impl TagSubject {
    pub fn branch_id(&self) -> BranchId {
        match self {
            Self::Branch(branch_id) => *branch_id,
            Self::Item { branch_id, .. } => *branch_id,
        }
    }
}

impl SqliteStore {
    /// Brings the subject's tags in line with `desired` by writing removals
    /// and additions into the pending `change_id`. Input tags are normalized
    /// first. The change is not committed here.
    ///
    /// Tag-count ceilings are the caller's concern.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn reconcile_tags(
        &mut self,
        subject: TagSubject,
        change_id: ChangeId,
        desired: &[String],
    ) -> Result<TagPatch, StoreError> {
        let desired = normalize_tags(desired)?;
        let now_ms = now_ms();
        let tx = self.write_tx()?;
        let patch = tags_tx::reconcile_tags(&tx, subject, change_id, &desired, now_ms)?;
        tx.commit()?;
        tracing::debug!(
            added = patch.added.len(),
            removed = patch.removed.len(),
            "reconciled tags"
        );
        Ok(patch)
    }

    /// Tag names alive for the subject in `view`, sorted.
    #[tracing::instrument(level = "debug", skip(self), err)]
    pub fn tags(&self, subject: TagSubject, view: BranchView) -> Result<Vec<String>, StoreError> {
        let resolved = resolve_view(&self.conn, subject.branch_id(), view)?;
        Ok(tags_tx::tags_at(&self.conn, subject, resolved)?
            .into_iter()
            .map(|row| row.name)
            .collect())
    }
}
