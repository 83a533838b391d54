#![forbid(unsafe_code)]

use gv_core::ids::{ActorId, BranchId, ChangeId, ItemId, ProjectId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForkBranchRequest {
    pub actor_id: ActorId,
    pub target_branch_id: BranchId,
    pub source_branch_id: BranchId,
    pub target_change_id: ChangeId,
    /// `None` forks the source branch's head.
    pub source_change_id: Option<ChangeId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateBranchRequest {
    pub project_id: ProjectId,
    pub parent_branch_id: Option<BranchId>,
    pub actor_id: ActorId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateBranchHeaderRequest {
    pub branch_id: BranchId,
    pub actor_id: ActorId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListBranchesRequest {
    pub project_id: ProjectId,
    pub name_contains: Option<String>,
    pub offset: usize,
    pub limit: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveQuipRequest {
    pub actor_id: ActorId,
    pub branch_id: BranchId,
    /// `None` creates a new quip.
    pub item_id: Option<ItemId>,
    pub text: String,
    pub timestamp_ms: i64,
    pub tags: Vec<String>,
}
