#![forbid(unsafe_code)]

use crate::ids::{
    ActorId, BranchHistoryId, BranchId, ChangeId, ChangeVersionId, ItemId, ItemVersionId,
    ProjectId,
};
use serde::Serialize;

/// Which slice of a branch's history a read should see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BranchView {
    /// Latest committed change.
    Head,
    /// A specific committed change on the branch.
    AsOf(ChangeId),
    /// Branch head with the given pending change laid over it.
    PendingOverlay(ChangeId),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const MAX_LIMIT: usize = 500;

    pub fn new(offset: usize, limit: usize) -> Self {
        Self {
            offset,
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn first(limit: usize) -> Self {
        Self::new(0, limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(0, 50)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeRow {
    pub change_id: ChangeId,
    pub branch_id: BranchId,
    pub actor_id: ActorId,
    pub committed: bool,
    pub committed_by: Option<ActorId>,
    pub created_at_ms: i64,
    pub committed_at_ms: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChangeVersionRow {
    pub change_version_id: ChangeVersionId,
    pub change_id: ChangeId,
    pub item_id: ItemId,
    pub item_version_id: ItemVersionId,
    pub alive: bool,
    pub created_at_ms: i64,
}

/// Item membership that a view resolves as current.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ActiveItemRow {
    pub item_id: ItemId,
    pub item_version_id: ItemVersionId,
    pub change_id: ChangeId,
}

/// Ids minted when an item version is attached to a change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct VersionRef {
    pub item_id: ItemId,
    pub item_version_id: ItemVersionId,
    pub change_version_id: ChangeVersionId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PendingChangeRow {
    pub actor_id: ActorId,
    pub branch_id: BranchId,
    pub change_id: ChangeId,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BranchHistoryRow {
    pub branch_history_id: BranchHistoryId,
    pub actor_id: ActorId,
    pub target_branch_id: BranchId,
    pub source_branch_id: BranchId,
    pub target_change_id: ChangeId,
    pub source_change_id: ChangeId,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TagPatch {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl TagPatch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn write_count(&self) -> usize {
        self.added.len() + self.removed.len()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BranchDetails {
    pub branch_id: BranchId,
    pub project_id: ProjectId,
    pub parent_branch_id: Option<BranchId>,
    pub change_id: ChangeId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CreatedBranch {
    pub branch_id: BranchId,
    pub header_change_id: ChangeId,
    pub pending_change_id: ChangeId,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QuipRow {
    pub item_id: ItemId,
    pub item_version_id: ItemVersionId,
    pub change_id: ChangeId,
    pub text: String,
    pub timestamp_ms: i64,
    pub tags: Vec<String>,
    pub pending: bool,
}
