//! Pipeline Tests
//!
//! - UPDATE / DELETE become versioned INSERTs with collectors in place
//! - Every versioned scan is bounded, unversioned entities are untouched
//! - The configured planner receives every generated scan

use crate::common::*;
use parking_lot::Mutex;
use std::sync::Arc;
use tessera::{NativePlanner, QueryPlanner};

fn collectors(plan: &PlanRoot) -> usize {
    plan.node
        .walk()
        .into_iter()
        .filter(|node| matches!(node.op(), Operator::IdentifierCollector { .. }))
        .count()
}

#[test]
fn update_becomes_versioned_insert() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let mut txn = t.context.begin().unwrap();

    let plan = modify_all(
        &items,
        ModifyOperation::Update,
        vec![("n".to_string(), Expr::literal(7i64))],
    );
    let out = t.context.rewrite(plan, &mut txn).unwrap();

    assert_eq!(out.kind, StatementKind::Insert);
    assert_eq!(collectors(&out), 1);
    let supersede = &out.node.inputs()[0];
    assert!(
        matches!(supersede.op(), Operator::SupersedeOwnVersions { version, .. } if *version == txn.provisional_tag()),
        "{}",
        out.node.explain()
    );
    let Operator::Extend { assignments } = supersede.inputs()[0].op() else {
        panic!("expected Extend:\n{}", out.node.explain());
    };
    assert_eq!(
        assignments,
        &vec![
            ("n".to_string(), Expr::literal(7i64)),
            (VERSION_KEY.to_string(), Expr::literal(-txn.start_seq)),
        ]
    );
}

#[test]
fn delete_becomes_tombstone_insert() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let mut txn = t.context.begin().unwrap();

    let out = t
        .context
        .rewrite(modify_all(&items, ModifyOperation::Delete, Vec::new()), &mut txn)
        .unwrap();
    assert_eq!(out.kind, StatementKind::Insert);
    let explain = out.node.explain();
    assert!(explain.starts_with("Modify(Insert public.items)"), "{}", explain);
    assert!(
        explain.contains(&format!("SupersedeOwnVersions(public.items provisional({}))", txn.start_seq)),
        "{}",
        explain
    );
    assert!(explain.contains("IdentifierCollector(public.items)"), "{}", explain);
}

#[test]
fn unversioned_entity_is_left_alone() {
    let t = TestContext::new();
    let plain = EntityRef::new(5, "public", "audit", DataModel::Relational).without_mvcc();
    let mut txn = t.context.begin().unwrap();

    let out = t
        .context
        .rewrite(modify_all(&plain, ModifyOperation::Delete, Vec::new()), &mut txn)
        .unwrap();
    assert_eq!(out.kind, StatementKind::Delete);
    assert_eq!(collectors(&out), 0);
    assert!(out.node.find(|n| matches!(n.op(), Operator::Native { .. })).is_none());
    assert!(txn.write_set().is_empty());

    // Reserved fields stay off limits
    let update = modify_all(
        &plain,
        ModifyOperation::Update,
        vec![(VERSION_KEY.to_string(), Expr::literal(1i64))],
    );
    assert!(matches!(
        t.context.rewrite(update, &mut txn),
        Err(Error::ReservedField { .. })
    ));
}

#[test]
fn rewrite_requires_active_transaction() {
    let t = TestContext::new();
    let items = t.table(1, "items");
    let mut txn = t.context.begin().unwrap();
    t.context.commit(&mut txn).unwrap();

    assert!(matches!(
        t.context.rewrite(select_all(&items), &mut txn),
        Err(Error::InvalidState(_))
    ));
}

/// Records every statement it is asked to plan
#[derive(Default)]
struct RecordingPlanner {
    planned: Mutex<Vec<QueryRequest>>,
}

impl QueryPlanner for RecordingPlanner {
    fn plan(&self, request: &QueryRequest) -> Result<PlanNode> {
        self.planned.lock().push(request.clone());
        NativePlanner.plan(request)
    }
}

#[test]
fn configured_planner_plans_every_scan() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let planner = Arc::new(RecordingPlanner::default());
    let collaborators = Collaborators::new(MemoryBackend::new()).with_planner(planner.clone());
    let context = Context::open(dir.path(), collaborators).unwrap();

    let a = EntityRef::new(1, "public", "a", DataModel::Relational);
    let b = EntityRef::new(2, "public", "b", DataModel::Relational);
    let join = PlanRoot::new(
        PlanNode::new(
            Operator::Join {
                condition: Expr::literal(true),
            },
            vec![PlanNode::scan(a), PlanNode::scan(b)],
        ),
        StatementKind::Select,
    );

    let mut txn = context.begin().unwrap();
    let out = context.rewrite(join, &mut txn).unwrap();

    let planned = planner.planned.lock();
    assert_eq!(planned.len(), 2);
    assert!(planned.iter().all(|request| request.internal));
    assert!(planned[0].text.contains("FROM public.a"));
    assert!(planned[1].text.contains("FROM public.b"));
    assert!(matches!(out.node.op(), Operator::Join { .. }));
    assert!(out
        .node
        .inputs()
        .iter()
        .all(|input| matches!(input.op(), Operator::Native { .. })));
}
