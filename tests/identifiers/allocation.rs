//! Allocation Tests
//!
//! - Inserted rows get fresh identities and the writer's provisional tag
//! - Entity-scoped identities are independent per entity
//! - Concurrent inserts never share an identity

use crate::common::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

#[test]
fn inserted_rows_get_fresh_identities() {
    let t = TestContext::new();
    let items = t.table(1, "items");

    let mut txn = t.context.begin().unwrap();
    let plan = t
        .context
        .rewrite(
            insert_values(&items, &["n"], vec![vec![Value::Int(1)], vec![Value::Int(2)]]),
            &mut txn,
        )
        .unwrap();

    let Operator::Values { fields, rows } = plan.node.inputs()[0].op() else {
        panic!("expected literal rows");
    };
    assert_eq!(fields, &["n", IDENTIFIER_KEY, VERSION_KEY]);
    assert_eq!(rows[0][1], Value::Int(1));
    assert_eq!(rows[1][1], Value::Int(2));
    assert!(rows.iter().all(|row| row[2] == Value::Int(-txn.start_seq)));
    assert_eq!(txn.reserved_count(), 2);
}

#[test]
fn explicit_identity_is_rejected() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let mut txn = t.context.begin().unwrap();

    let explicit = insert_values(&items, &["n", "_eid"], vec![vec![Value::Int(1), Value::Int(5)]]);
    assert!(matches!(
        t.context.rewrite(explicit, &mut txn),
        Err(Error::ReservedField { .. })
    ));

    // Null is the sentinel and gets replaced
    let sentinel = insert_values(&items, &["n", "_eid"], vec![vec![Value::Int(1), Value::Null]]);
    let plan = t.context.rewrite(sentinel, &mut txn).unwrap();
    assert_eq!(stamped_ids(&plan).len(), 1);
}

#[test]
fn entity_scoped_identities_are_independent() {
    let t = TestContext::with_config(TesseraConfig {
        entity_scoped_identifiers: true,
        ..TesseraConfig::default()
    });
    let items = t.table(1, "items");
    let orders = t.table(2, "orders");

    assert_eq!(seed(&t, &items, 3), vec![1, 2, 3]);
    assert_eq!(seed(&t, &orders, 2), vec![1, 2]);

    // Permanently removed entries become available to their entity only
    t.context.release_identifiers(&items, &[2]);
    assert_eq!(seed(&t, &items, 1), vec![2]);
    assert_eq!(seed(&t, &orders, 1), vec![3]);
}

#[test]
fn global_identities_are_shared_across_entities() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let orders = t.table(2, "orders");

    let a = seed(&t, &items, 2);
    let b = seed(&t, &orders, 2);
    assert!(a.iter().all(|id| !b.contains(id)));
}

#[test]
fn concurrent_inserts_never_share_an_identity() {
    let t = Arc::new(TestContext::new());
    let items = t.table(1, "items");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let t = Arc::clone(&t);
            let items = items.clone();
            thread::spawn(move || {
                (0..20)
                    .flat_map(|_| seed(&t, &items, 5))
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(seen.insert(id), "identity {} handed out twice", id);
        }
    }
    assert_eq!(seen.len(), 8 * 20 * 5);
}
