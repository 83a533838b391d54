#![forbid(unsafe_code)]

mod common;

use common::{actor, bare_branch, open_store};
use gv_core::ids::{ActorId, BranchId, ChangeId, ItemId};
use gv_core::{BranchView, Page};
use gv_storage::{ForkBranchRequest, SqliteStore, StoreError};

fn commit_items(
    store: &mut SqliteStore,
    branch_id: BranchId,
    actor_id: &ActorId,
    items: &[ItemId],
) -> ChangeId {
    let change_id = store.create_change(branch_id, actor_id).expect("change");
    for item_id in items {
        store
            .add_item_to_change(*item_id, change_id, false)
            .expect("add item");
    }
    store.commit_change(change_id, actor_id).expect("commit");
    change_id
}

fn fork_request(
    actor_id: &ActorId,
    target_branch_id: BranchId,
    source_branch_id: BranchId,
    target_change_id: ChangeId,
    source_change_id: Option<ChangeId>,
) -> ForkBranchRequest {
    ForkBranchRequest {
        actor_id: actor_id.clone(),
        target_branch_id,
        source_branch_id,
        target_change_id,
        source_change_id,
    }
}

#[test]
fn fork_preserves_item_identity() {
    let (_dir, mut store) = open_store();
    let (project_id, source) = bare_branch(&mut store);
    let target = store
        .create_bare_branch(project_id, Some(source))
        .expect("target branch");
    let alice = actor("alice");

    let item_id = store.create_item().expect("item");
    commit_items(&mut store, source, &alice, &[item_id]);
    let source_row = store
        .item_at(source, item_id, BranchView::Head)
        .expect("source item")
        .expect("alive on source");

    let fork_change = store.create_change(target, &alice).expect("fork change");
    store
        .fork_branch(fork_request(&alice, target, source, fork_change, None))
        .expect("fork");
    store.commit_change(fork_change, &alice).expect("commit fork");

    let target_row = store
        .item_at(target, item_id, BranchView::Head)
        .expect("target item")
        .expect("alive on target");
    assert_eq!(target_row.item_id, source_row.item_id);
    assert_eq!(
        target_row.item_version_id, source_row.item_version_id,
        "the fork shares versions instead of copying them"
    );
    assert_eq!(target_row.change_id, fork_change);

    // Editing on the fork leaves the source untouched.
    let edit = store.create_change(target, &alice).expect("edit");
    let edited = store
        .add_item_to_change(item_id, edit, false)
        .expect("edit item");
    store.commit_change(edit, &alice).expect("commit edit");
    assert_eq!(
        store
            .item_at(target, item_id, BranchView::Head)
            .expect("target item")
            .map(|row| row.item_version_id),
        Some(edited.item_version_id)
    );
    assert_eq!(
        store
            .item_at(source, item_id, BranchView::Head)
            .expect("source item")
            .map(|row| row.item_version_id),
        Some(source_row.item_version_id)
    );
}

#[test]
fn fork_as_of_an_earlier_change_copies_that_snapshot() {
    let (_dir, mut store) = open_store();
    let (project_id, source) = bare_branch(&mut store);
    let target = store
        .create_bare_branch(project_id, Some(source))
        .expect("target branch");
    let alice = actor("alice");

    let early_item = store.create_item().expect("early");
    let late_item = store.create_item().expect("late");
    let early = commit_items(&mut store, source, &alice, &[early_item]);
    commit_items(&mut store, source, &alice, &[late_item]);

    let fork_change = store.create_change(target, &alice).expect("fork change");
    let history_id = store
        .fork_branch(fork_request(&alice, target, source, fork_change, Some(early)))
        .expect("fork");
    store.commit_change(fork_change, &alice).expect("commit fork");

    let items: Vec<_> = store
        .active_items(target, BranchView::Head)
        .expect("target items")
        .into_iter()
        .map(|row| row.item_id)
        .collect();
    assert_eq!(items, vec![early_item]);

    let history = store
        .branch_history(target, Page::default())
        .expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].branch_history_id, history_id);
    assert_eq!(history[0].source_branch_id, source);
    assert_eq!(history[0].source_change_id, early);
    assert_eq!(history[0].target_change_id, fork_change);
    assert_eq!(history[0].actor_id, alice);
}

#[test]
fn fork_keeps_versions_already_in_the_target_change() {
    let (_dir, mut store) = open_store();
    let (project_id, source) = bare_branch(&mut store);
    let target = store
        .create_bare_branch(project_id, None)
        .expect("target branch");
    let alice = actor("alice");

    let shared = store.create_item().expect("shared");
    let other = store.create_item().expect("other");
    commit_items(&mut store, source, &alice, &[shared, other]);

    let fork_change = store.create_change(target, &alice).expect("fork change");
    let local = store
        .add_item_to_change(shared, fork_change, false)
        .expect("local edit");
    store
        .fork_branch(fork_request(&alice, target, source, fork_change, None))
        .expect("fork");
    store.commit_change(fork_change, &alice).expect("commit");

    let rows = store
        .active_items(target, BranchView::Head)
        .expect("target items");
    assert_eq!(rows.len(), 2);
    let shared_row = rows
        .iter()
        .find(|row| row.item_id == shared)
        .expect("shared item present");
    assert_eq!(shared_row.item_version_id, local.item_version_id);
}

#[test]
fn fork_rejects_invalid_targets_and_sources() {
    let (_dir, mut store) = open_store();
    let (project_id, source) = bare_branch(&mut store);
    let target = store
        .create_bare_branch(project_id, None)
        .expect("target branch");
    let alice = actor("alice");

    let empty_target_change = store.create_change(target, &alice).expect("change");
    let err = store
        .fork_branch(fork_request(&alice, target, source, empty_target_change, None))
        .expect_err("source has no history");
    assert!(matches!(err, StoreError::NotFound(_)));

    let item_id = store.create_item().expect("item");
    let source_change = commit_items(&mut store, source, &alice, &[item_id]);

    let committed_target = store.create_change(target, &alice).expect("change");
    store
        .commit_change(committed_target, &alice)
        .expect("commit target");
    let err = store
        .fork_branch(fork_request(&alice, target, source, committed_target, None))
        .expect_err("committed target");
    assert!(matches!(err, StoreError::InvalidState(_)));

    let err = store
        .fork_branch(fork_request(
            &alice,
            source,
            source,
            empty_target_change,
            None,
        ))
        .expect_err("target change on another branch");
    assert!(matches!(err, StoreError::Validation(_)));

    let err = store
        .fork_branch(fork_request(
            &alice,
            target,
            source,
            empty_target_change,
            Some(empty_target_change),
        ))
        .expect_err("source change must be committed on the source");
    assert!(matches!(err, StoreError::NotFound(_)));

    assert!(
        store
            .branch_history(target, Page::default())
            .expect("history")
            .is_empty(),
        "failed forks leave no record"
    );
    assert_eq!(store.head_change(source).expect("head"), Some(source_change));
}
