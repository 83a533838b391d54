#![forbid(unsafe_code)]
#![allow(dead_code)]

use gv_core::ids::{ActorId, BranchId, ProjectId};
use gv_storage::{CreateBranchRequest, SqliteStore};
use tempfile::TempDir;

pub fn open_store() -> (TempDir, SqliteStore) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = SqliteStore::open(dir.path()).expect("open store");
    (dir, store)
}

pub fn actor(value: &str) -> ActorId {
    ActorId::try_new(value).expect("actor id")
}

pub fn tags(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Project plus one bare branch, no history.
pub fn bare_branch(store: &mut SqliteStore) -> (ProjectId, BranchId) {
    let project_id = store.create_project().expect("create project");
    let branch_id = store
        .create_bare_branch(project_id, None)
        .expect("create bare branch");
    (project_id, branch_id)
}

pub fn create_request(
    project_id: ProjectId,
    parent_branch_id: Option<BranchId>,
    actor_id: &ActorId,
    name: &str,
    branch_tags: &[&str],
) -> CreateBranchRequest {
    CreateBranchRequest {
        project_id,
        parent_branch_id,
        actor_id: actor_id.clone(),
        name: name.to_string(),
        description: format!("{name} description"),
        tags: tags(branch_tags),
    }
}
