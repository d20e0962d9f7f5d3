//! Data Model Tests
//!
//! Document collections and graphs get the same identity and version
//! treatment as tables, in their own statement language.

use crate::common::*;
use std::collections::BTreeMap;
use tessera::QueryLanguage;

fn document(pairs: &[(&str, Value)]) -> Value {
    Value::Document(
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn insert(entity: &EntityRef, input: Operator) -> PlanRoot {
    PlanRoot::new(
        PlanNode::unary(
            Operator::Modify {
                entity: entity.clone(),
                operation: ModifyOperation::Insert,
                updates: Vec::new(),
            },
            PlanNode::leaf(input),
        ),
        StatementKind::Insert,
    )
}

#[test]
fn documents_are_stamped() {
    let t = TestContext::new();
    let users = EntityRef::new(10, "app", "users", DataModel::Document);
    let mut txn = t.context.begin().unwrap();

    let out = t
        .context
        .rewrite(
            insert(
                &users,
                Operator::Documents {
                    documents: vec![document(&[("name", Value::from("ada"))])],
                },
            ),
            &mut txn,
        )
        .unwrap();

    let Operator::Documents { documents } = out.node.inputs()[0].op() else {
        panic!("expected documents");
    };
    assert_eq!(documents[0].get(IDENTIFIER_KEY), Some(&Value::Int(1)));
    assert_eq!(documents[0].get(VERSION_KEY), Some(&Value::Int(-txn.start_seq)));
    assert_eq!(txn.write_set().get(10).map(|w| w.identities().count()), Some(1));
}

#[test]
fn nested_reserved_document_field_is_rejected() {
    let t = TestContext::new();
    let users = EntityRef::new(10, "app", "users", DataModel::Document);
    let mut txn = t.context.begin().unwrap();

    let nested = document(&[("profile", document(&[("_vid", Value::Int(3))]))]);
    let err = t
        .context
        .rewrite(insert(&users, Operator::Documents { documents: vec![nested] }), &mut txn)
        .unwrap_err();
    assert!(matches!(err, Error::ReservedField { .. }));
    assert!(err.is_user_error());
}

#[test]
fn document_scan_is_an_aggregation_pipeline() {
    let t = TestContext::new();
    let users = EntityRef::new(10, "app", "users", DataModel::Document);
    let mut txn = t.context.begin().unwrap();

    let out = t.context.rewrite(select_all(&users), &mut txn).unwrap();
    let Operator::Native { request } = out.node.op() else {
        panic!("scan was not bounded");
    };
    assert_eq!(request.language, QueryLanguage::Mql);
    assert!(request.text.starts_with("db.users.aggregate("));
    assert!(request.text.contains("$replaceRoot"));
}

#[test]
fn graph_elements_are_stamped_but_scans_unsupported() {
    let t = TestContext::new();
    let social = EntityRef::new(20, "graph", "social", DataModel::Graph);
    let mut txn = t.context.begin().unwrap();

    let out = t
        .context
        .rewrite(
            insert(
                &social,
                Operator::GraphValues {
                    nodes: vec![document(&[("name", Value::from("a"))]), document(&[])],
                    edges: vec![document(&[("kind", Value::from("knows"))])],
                },
            ),
            &mut txn,
        )
        .unwrap();
    let Operator::GraphValues { nodes, edges } = out.node.inputs()[0].op() else {
        panic!("expected graph values");
    };
    let ids: Vec<_> = nodes
        .iter()
        .chain(edges)
        .map(|element| element.get(IDENTIFIER_KEY).and_then(Value::as_i64))
        .collect();
    assert_eq!(ids, vec![Some(1), Some(2), Some(3)]);

    let err = t.context.rewrite(select_all(&social), &mut txn).unwrap_err();
    assert!(matches!(err, Error::Unsupported { .. }));
}

#[test]
fn graph_property_named_like_a_reserved_field_is_rejected() {
    let t = TestContext::new();
    let social = EntityRef::new(20, "graph", "social", DataModel::Graph);
    let mut txn = t.context.begin().unwrap();

    let err = t
        .context
        .rewrite(
            insert(
                &social,
                Operator::GraphValues {
                    nodes: vec![document(&[("_eid", Value::Int(1))])],
                    edges: Vec::new(),
                },
            ),
            &mut txn,
        )
        .unwrap_err();
    assert!(matches!(err, Error::ReservedField { .. }));
}
