#![forbid(unsafe_code)]

mod common;

use common::{actor, bare_branch, open_store};
use gv_core::ids::ChangeId;
use gv_core::{BranchView, Page};
use gv_storage::StoreError;

#[test]
fn committed_change_rejects_further_writes() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let change_id = store.create_change(branch_id, &alice).expect("create change");
    assert!(!store.is_change_committed(change_id).expect("state"));

    let item_id = store.create_item().expect("create item");
    store
        .add_item_to_change(item_id, change_id, false)
        .expect("add item while pending");
    assert_eq!(
        store.commit_change(change_id, &alice).expect("commit"),
        change_id
    );
    assert!(store.is_change_committed(change_id).expect("state"));

    let err = store
        .add_item_to_change(item_id, change_id, false)
        .expect_err("committed change is immutable");
    assert!(matches!(err, StoreError::InvalidState(_)));
    assert_eq!(err.code(), "INVALID_STATE");

    let err = store
        .commit_change(change_id, &alice)
        .expect_err("second commit must fail");
    assert!(matches!(err, StoreError::InvalidState(_)));

    let err = store
        .discard_change(change_id)
        .expect_err("committed change cannot be discarded");
    assert!(matches!(err, StoreError::InvalidState(_)));

    assert_eq!(
        store.count_items_in_change(change_id).expect("count"),
        1,
        "rejected writes leave the change untouched"
    );
}

#[test]
fn unknown_and_sentinel_change_ids_are_not_found() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);

    let err = store
        .is_change_committed(ChangeId::new(9_999))
        .expect_err("unknown change");
    assert!(matches!(err, StoreError::NotFound(_)));
    assert_eq!(err.code(), "NOT_FOUND");

    let err = store
        .is_change_committed(ChangeId::SENTINEL)
        .expect_err("sentinel is not a change");
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.change(ChangeId::SENTINEL).expect("read").is_none());

    let err = store
        .create_change(gv_core::ids::BranchId::new(branch_id.get() + 100), &actor("alice"))
        .expect_err("unknown branch");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn head_tracks_highest_committed_change() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    assert_eq!(store.head_change(branch_id).expect("head"), None);
    assert!(
        store
            .active_items(branch_id, BranchView::Head)
            .expect("active at empty head")
            .is_empty()
    );

    let first = store.create_change(branch_id, &alice).expect("first");
    let item_a = store.create_item().expect("item a");
    store.add_item_to_change(item_a, first, false).expect("add a");
    store.commit_change(first, &alice).expect("commit first");

    let second = store.create_change(branch_id, &alice).expect("second");
    let item_b = store.create_item().expect("item b");
    store.add_item_to_change(item_b, second, false).expect("add b");
    store.commit_change(second, &alice).expect("commit second");

    let pending = store.create_change(branch_id, &alice).expect("pending");
    let item_c = store.create_item().expect("item c");
    store.add_item_to_change(item_c, pending, false).expect("add c");

    assert_eq!(store.head_change(branch_id).expect("head"), Some(second));

    let at_head: Vec<_> = store
        .active_items(branch_id, BranchView::Head)
        .expect("active at head")
        .into_iter()
        .map(|row| row.item_id)
        .collect();
    assert_eq!(at_head, vec![item_a, item_b]);

    let at_first: Vec<_> = store
        .active_items(branch_id, BranchView::AsOf(first))
        .expect("active as of first")
        .into_iter()
        .map(|row| row.item_id)
        .collect();
    assert_eq!(at_first, vec![item_a]);

    let overlay: Vec<_> = store
        .active_items(branch_id, BranchView::PendingOverlay(pending))
        .expect("overlay")
        .into_iter()
        .map(|row| row.item_id)
        .collect();
    assert_eq!(overlay, vec![item_a, item_b, item_c]);

    let versions = store
        .branch_versions(branch_id, None, Page::default())
        .expect("versions");
    let ids: Vec<_> = versions.iter().map(|row| row.change_id).collect();
    assert_eq!(ids, vec![second, first]);
    assert!(versions.iter().all(|row| row.committed));
    assert_eq!(versions[0].committed_by.as_ref(), Some(&alice));

    let newer = store
        .branch_versions(branch_id, Some(first), Page::default())
        .expect("versions after first");
    assert_eq!(newer.len(), 1);
    assert_eq!(newer[0].change_id, second);
}

#[test]
fn tombstone_hides_item_from_later_views_only() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let created = store.create_change(branch_id, &alice).expect("create");
    let item_id = store.create_item().expect("item");
    let original = store
        .add_item_to_change(item_id, created, false)
        .expect("add");
    store.commit_change(created, &alice).expect("commit create");

    let removed = store.create_change(branch_id, &alice).expect("remove");
    store
        .add_item_to_change(item_id, removed, true)
        .expect("tombstone");
    store.commit_change(removed, &alice).expect("commit remove");

    assert_eq!(
        store
            .item_at(branch_id, item_id, BranchView::Head)
            .expect("item at head"),
        None
    );
    let earlier = store
        .item_at(branch_id, item_id, BranchView::AsOf(created))
        .expect("item as of create")
        .expect("alive before removal");
    assert_eq!(earlier.item_version_id, original.item_version_id);

    let rows = store
        .items_in_change(removed, Page::default())
        .expect("items in removal");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].alive);
}

#[test]
fn re_adding_an_item_supersedes_its_membership_in_the_same_change() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let change_id = store.create_change(branch_id, &alice).expect("change");
    let item_id = store.create_item().expect("item");
    let first = store
        .add_item_to_change(item_id, change_id, false)
        .expect("first write");
    let second = store
        .add_item_to_change(item_id, change_id, false)
        .expect("second write");
    assert_ne!(first.item_version_id, second.item_version_id);
    store.commit_change(change_id, &alice).expect("commit");

    let rows = store
        .items_in_change(change_id, Page::default())
        .expect("items");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].item_version_id, second.item_version_id);
    assert_eq!(rows[0].change_version_id, second.change_version_id);
}

#[test]
fn discarding_a_pending_change_leaves_history_alone() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let committed = store.create_change(branch_id, &alice).expect("committed");
    store.commit_change(committed, &alice).expect("commit");

    let scratch = store.create_change(branch_id, &alice).expect("scratch");
    let item_id = store.create_item().expect("item");
    store
        .add_item_to_change(item_id, scratch, false)
        .expect("add");
    store.discard_change(scratch).expect("discard");

    assert!(store.change(scratch).expect("read").is_none());
    assert_eq!(store.head_change(branch_id).expect("head"), Some(committed));
    assert!(
        store
            .active_items(branch_id, BranchView::Head)
            .expect("active")
            .is_empty()
    );

    let err = store
        .items_in_change(scratch, Page::default())
        .expect_err("discarded change is gone");
    assert!(matches!(err, StoreError::NotFound(_)));
}

#[test]
fn pending_change_contents_are_not_served_as_committed_reads() {
    let (_dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let pending = store.create_change(branch_id, &alice).expect("pending");
    let err = store
        .items_in_change(pending, Page::default())
        .expect_err("pending change read");
    assert!(matches!(err, StoreError::InvalidState(_)));
    assert!(
        store
            .change_at(branch_id, pending)
            .expect("change at")
            .is_none()
    );

    let err = store
        .active_items(branch_id, BranchView::AsOf(pending))
        .expect_err("as-of requires a committed change");
    assert!(matches!(err, StoreError::NotFound(_)));

    store.commit_change(pending, &alice).expect("commit");
    let row = store
        .change_at(branch_id, pending)
        .expect("change at")
        .expect("committed change is visible");
    assert!(row.committed);
    assert_eq!(row.actor_id, alice);

    let err = store
        .active_items(branch_id, BranchView::PendingOverlay(pending))
        .expect_err("overlay requires a pending change");
    assert!(matches!(err, StoreError::InvalidState(_)));
}

#[test]
fn deleting_a_project_removes_its_branches() {
    let (_dir, mut store) = open_store();
    let (project_id, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");
    let change_id = store.create_change(branch_id, &alice).expect("change");
    store.commit_change(change_id, &alice).expect("commit");

    assert!(store.delete_project(project_id).expect("delete"));
    assert!(!store.delete_project(project_id).expect("delete again"));

    let err = store.head_change(branch_id).expect_err("branch is gone");
    assert!(matches!(err, StoreError::NotFound(_)));
    assert!(store.change(change_id).expect("read").is_none());
}
