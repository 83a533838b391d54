#![forbid(unsafe_code)]

mod common;

use common::{actor, bare_branch, open_store};
use gv_core::ids::ChangeId;
use gv_storage::{SqliteStore, StoreError};
use std::sync::{Arc, Barrier};
use std::thread;

const RACERS: usize = 8;

#[test]
fn concurrent_creates_yield_a_single_pending_change() {
    let (dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);
    let alice = actor("alice");

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|_| {
            let barrier = Arc::clone(&barrier);
            let path = dir.path().to_path_buf();
            let alice = alice.clone();
            thread::spawn(move || {
                let mut store = SqliteStore::open(&path).expect("open store per unit of work");
                barrier.wait();
                store.create_pending_change(&alice, branch_id)
            })
        })
        .collect();

    let mut created: Vec<ChangeId> = Vec::new();
    let mut conflicts = 0;
    for handle in handles {
        match handle.join().expect("racer thread") {
            Ok(change_id) => created.push(change_id),
            Err(StoreError::Conflict(_)) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert!(!created.is_empty(), "at least the reservation winner succeeds");
    assert_eq!(created.len() + conflicts, RACERS);
    assert!(
        created.iter().all(|change_id| *change_id == created[0]),
        "every success observes the same pending change"
    );

    assert_eq!(
        store.count_pending_changes(&alice, branch_id).expect("count"),
        1
    );
    assert_eq!(
        store.pending_change(&alice, branch_id).expect("slot"),
        Some(created[0])
    );
}

#[test]
fn different_actors_do_not_interfere() {
    let (dir, mut store) = open_store();
    let (_, branch_id) = bare_branch(&mut store);

    let barrier = Arc::new(Barrier::new(RACERS));
    let handles: Vec<_> = (0..RACERS)
        .map(|index| {
            let barrier = Arc::clone(&barrier);
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let actor_id = actor(&format!("actor-{index}"));
                let mut store = SqliteStore::open(&path).expect("open store per unit of work");
                barrier.wait();
                store.create_pending_change(&actor_id, branch_id)
            })
        })
        .collect();

    let mut change_ids: Vec<ChangeId> = handles
        .into_iter()
        .map(|handle| {
            handle
                .join()
                .expect("racer thread")
                .expect("distinct pairs never conflict")
        })
        .collect();
    change_ids.sort();
    change_ids.dedup();
    assert_eq!(change_ids.len(), RACERS);
}
