//! First-Committer-Wins Tests
//!
//! - A write on a record committed after the writer started is rejected
//! - Disjoint writers both commit
//! - Racing writers: exactly one wins

use crate::common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

// ============================================================================
// Conflicts
// ============================================================================

#[test]
fn second_writer_of_same_record_conflicts() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let ids = seed(&t, &items, 1);

    let mut a = t.context.begin().unwrap();
    let mut b = t.context.begin().unwrap();
    update(&t, &mut a, &items, &ids);
    update(&t, &mut b, &items, &ids);

    let commit_a = t.context.commit(&mut a).unwrap().unwrap();
    let err = t.context.commit(&mut b).unwrap_err();
    assert!(err.is_retryable());
    match err {
        Error::WriteConflict { start_seq, observed } => {
            assert_eq!(start_seq, b.start_seq);
            assert_eq!(observed, commit_a);
        }
        other => panic!("expected a write conflict, got {:?}", other),
    }

    // The loser's provisional version is gone, the winner's is committed
    let versions = t.backend.versions_of(&items, ids[0]);
    assert!(versions.contains(&commit_a));
    assert!(versions.iter().all(|&v| v > 0), "leftover provisional: {:?}", versions);
}

#[test]
fn conflict_detected_by_backend_for_foreign_commit() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let ids = seed(&t, &items, 1);

    let mut a = t.context.begin().unwrap();
    update(&t, &mut a, &items, &ids);

    // A version committed by another process, unknown to the commit log
    t.backend.insert(&items, ids[0], a.start_seq + 50);

    let err = t.context.commit(&mut a).unwrap_err();
    assert!(matches!(err, Error::WriteConflict { observed, .. } if observed == a.start_seq + 50));
    assert!(t
        .backend
        .executed()
        .iter()
        .any(|s| s.starts_with("SELECT MAX(_vid) AS max_vid FROM public.items")));
}

#[test]
fn older_commits_do_not_conflict() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let ids = seed(&t, &items, 2);

    let mut a = t.context.begin().unwrap();
    update(&t, &mut a, &items, &ids);
    assert!(t.context.commit(&mut a).unwrap().is_some());
}

// ============================================================================
// Disjoint writers
// ============================================================================

#[test]
fn disjoint_writers_both_commit() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let ids = seed(&t, &items, 2);

    let mut a = t.context.begin().unwrap();
    let mut b = t.context.begin().unwrap();
    update(&t, &mut a, &items, &ids[..1]);
    update(&t, &mut b, &items, &ids[1..]);

    let commit_a = t.context.commit(&mut a).unwrap().unwrap();
    let commit_b = t.context.commit(&mut b).unwrap().unwrap();
    assert!(commit_b > commit_a);
    assert_eq!(t.context.commit_log().last_commit(&items.identity(ids[0])), Some(commit_a));
    assert_eq!(t.context.commit_log().last_commit(&items.identity(ids[1])), Some(commit_b));
}

#[test]
fn read_only_transaction_commits_without_sequence() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    seed(&t, &items, 1);

    let mut reader = t.context.begin().unwrap();
    t.context.rewrite(select_all(&items), &mut reader).unwrap();
    assert_eq!(t.context.commit(&mut reader).unwrap(), None);
}

// ============================================================================
// Racing writers
// ============================================================================

#[test]
fn racing_writers_exactly_one_wins() {
    let t = Arc::new(TestContext::new());
    let items = t.table(1, "items");
    let ids = seed(&t, &items, 1);

    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let t = Arc::clone(&t);
            let items = items.clone();
            let ids = ids.clone();
            let barrier = Arc::clone(&barrier);
            let wins = Arc::clone(&wins);
            let conflicts = Arc::clone(&conflicts);
            thread::spawn(move || {
                let mut txn = t.context.begin().unwrap();
                update(&t, &mut txn, &items, &ids);

                // Every writer started before any of them commits
                barrier.wait();

                match t.context.commit(&mut txn) {
                    Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                    Err(Error::WriteConflict { .. }) => conflicts.fetch_add(1, Ordering::SeqCst),
                    Err(e) => panic!("unexpected commit error: {}", e),
                };
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(conflicts.load(Ordering::SeqCst), threads - 1);
    let committed: Vec<i64> = t.backend.versions_of(&items, ids[0]);
    assert_eq!(committed.len(), 2, "seed version plus one winner: {:?}", committed);
}
