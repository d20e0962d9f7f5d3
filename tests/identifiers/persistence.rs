//! Persistence Tests
//!
//! - The allocator counter survives a restart; prefetched ids are skipped
//! - Exhausting the counter switches to scan mode

use crate::common::*;
use std::sync::Arc;
use tessera::UnassignedIdentifierScan;

#[test]
fn identities_are_not_reused_after_restart() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let before = seed(&t, &items, 3);
    t.context.shutdown().unwrap();
    assert!(matches!(t.context.begin(), Err(Error::InvalidState(_))));

    let reopened = Context::open(t.dir.path(), Collaborators::new(t.backend.clone())).unwrap();
    let mut txn = reopened.begin().unwrap();
    let plan = reopened
        .rewrite(insert_values(&items, &["n"], vec![vec![Value::Int(1)]]), &mut txn)
        .unwrap();
    let after = stamped_ids(&plan);
    assert!(after[0] > *before.iter().max().unwrap());
    // Everything prefetched before the restart was skipped
    assert_eq!(after[0], reopened.config().queue_size as i64 + 1);
}

struct FixedScan(Vec<i64>);

impl UnassignedIdentifierScan for FixedScan {
    fn unassigned_identifiers(&self, limit: usize) -> Result<Vec<i64>> {
        Ok(self.0.iter().copied().take(limit).collect())
    }
}

fn small_config() -> TesseraConfig {
    TesseraConfig {
        max_identifier: 4,
        queue_size: 2,
        ..TesseraConfig::default()
    }
}

#[test]
fn exhausted_counter_switches_to_scan_mode() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::new();
    let collaborators =
        Collaborators::new(backend.clone()).with_scanner(Arc::new(FixedScan(vec![2])));
    let context = Context::open_with_config(dir.path(), small_config(), collaborators).unwrap();

    let items = EntityRef::new(1, "public", "items", DataModel::Relational);
    let mut txn = context.begin().unwrap();
    let rows = (0..5).map(|i| vec![Value::Int(i)]).collect();
    let plan = context
        .rewrite(insert_values(&items, &["n"], rows), &mut txn)
        .unwrap();
    assert_eq!(stamped_ids(&plan), vec![1, 2, 3, 4, 2]);
    assert!(context.allocator().is_scan_mode());
}

#[test]
fn exhausted_counter_without_scan_fails() {
    let t = TestContext::with_config(small_config());
    let items = t.table(1, "items");
    assert_eq!(seed(&t, &items, 4), vec![1, 2, 3, 4]);

    let mut txn = t.context.begin().unwrap();
    let err = t
        .context
        .rewrite(insert_values(&items, &["n"], vec![vec![Value::Int(0)]]), &mut txn)
        .unwrap_err();
    assert!(matches!(err, Error::Exhausted { .. }));
    assert!(!err.is_retryable());
    assert_eq!(txn.reserved_count(), 0);
}
