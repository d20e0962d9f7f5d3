//! Identifier injection and versioned writes
//!
//! Rewrites every write on a multi-version entity so that it only ever
//! appends new versions:
//!
//! ```text
//! INSERT  Values/Documents/GraphValues  -> literal rows get a fresh _eid and _vid = -start
//! INSERT  <any other input>             -> AssignIdentifiers(-start) under the modify
//! UPDATE  set a = x                     -> INSERT Supersede(Extend(a = x, _vid = -start))
//! DELETE                                -> INSERT Supersede(Extend(_eid = -_eid, _vid = -start))
//! ```
//!
//! A second write to the same record in one transaction must not leave two
//! rows at `-start`: the supersede step removes the earlier one first.
//!
//! User statements may not write `_eid` / `_vid` themselves. A literal row
//! may only leave them at the sentinel (null or 0); documents and graph
//! elements may not carry them at all.

use crate::node::{Expr, ModifyOperation, Operator, PlanNode, PlanRoot, StatementKind};
use std::sync::Arc;
use tessera_concurrency::{CollectorRole, TransactionContext};
use tessera_core::reserved::{self, IDENTIFIER_KEY, VERSION_KEY};
use tessera_core::{
    CollectedIdentifiers, EntityRef, Error, IdentifierSource, Result, Value, Version,
};
use tracing::debug;

/// Chooses the identifier scope of an entity
pub trait IdentifierSources: Send + Sync {
    /// Source new identities of `entity` are drawn from
    fn source_for(&self, entity: &EntityRef) -> Arc<dyn IdentifierSource>;
}

/// Every entity draws from one shared source
pub struct SharedIdentifiers(pub Arc<dyn IdentifierSource>);

impl IdentifierSources for SharedIdentifiers {
    fn source_for(&self, _entity: &EntityRef) -> Arc<dyn IdentifierSource> {
        Arc::clone(&self.0)
    }
}

/// Rewrite all writes of `root`
pub fn inject_identifiers(
    root: PlanRoot,
    sources: &dyn IdentifierSources,
    txn: &mut TransactionContext,
) -> Result<PlanRoot> {
    let mut versioned_rewrite = false;
    let node = rewrite(root.node, sources, txn, &mut versioned_rewrite)?;
    let kind = match root.kind {
        StatementKind::Update | StatementKind::Delete if versioned_rewrite => StatementKind::Insert,
        kind => kind,
    };
    Ok(PlanRoot::new(node, kind))
}

fn rewrite(
    node: PlanNode,
    sources: &dyn IdentifierSources,
    txn: &mut TransactionContext,
    versioned_rewrite: &mut bool,
) -> Result<PlanNode> {
    let (id, op, inputs) = node.into_parts();
    let inputs = inputs
        .into_iter()
        .map(|input| rewrite(input, sources, txn, versioned_rewrite))
        .collect::<Result<Vec<_>>>()?;

    match &op {
        Operator::Documents { documents } => documents.iter().try_for_each(reserved::check_value)?,
        Operator::GraphValues { nodes, edges } => {
            nodes.iter().chain(edges).try_for_each(reserved::check_value)?
        }
        _ => {}
    }

    match op {
        Operator::Modify {
            entity,
            operation,
            updates,
        } => {
            if operation == ModifyOperation::Update {
                reserved::check_fields(updates.iter().map(|(field, _)| field.as_str()))?;
            }
            if !entity.mvcc {
                return Ok(PlanNode::from_parts(
                    id,
                    Operator::Modify {
                        entity,
                        operation,
                        updates,
                    },
                    inputs,
                ));
            }

            let tag = txn.provisional_tag();
            let input = single_input(&entity, inputs)?;
            let input = match operation {
                ModifyOperation::Insert => {
                    let source = sources.source_for(&entity);
                    insert_identities(&entity, input, source, tag, txn)?
                }
                ModifyOperation::Update => {
                    *versioned_rewrite = true;
                    let mut assignments = updates;
                    assignments.push((VERSION_KEY.to_string(), version_literal(tag)));
                    supersede(&entity, tag, PlanNode::unary(Operator::Extend { assignments }, input))
                }
                ModifyOperation::Delete => {
                    *versioned_rewrite = true;
                    let assignments = vec![
                        (
                            IDENTIFIER_KEY.to_string(),
                            Expr::Negate(Box::new(Expr::field(IDENTIFIER_KEY))),
                        ),
                        (VERSION_KEY.to_string(), version_literal(tag)),
                    ];
                    supersede(&entity, tag, PlanNode::unary(Operator::Extend { assignments }, input))
                }
            };

            debug!(txn = %txn.txn_id, entity = %entity, ?operation, "write rewritten to versioned insert");
            Ok(PlanNode::from_parts(
                id,
                Operator::Modify {
                    entity,
                    operation: ModifyOperation::Insert,
                    updates: Vec::new(),
                },
                vec![input],
            ))
        }
        op => Ok(PlanNode::from_parts(id, op, inputs)),
    }
}

fn supersede(entity: &EntityRef, tag: Version, input: PlanNode) -> PlanNode {
    PlanNode::unary(
        Operator::SupersedeOwnVersions {
            entity: entity.clone(),
            version: tag,
        },
        input,
    )
}

fn version_literal(tag: Version) -> Expr {
    Expr::Literal(Value::Int(tag.as_i64()))
}

fn single_input(entity: &EntityRef, mut inputs: Vec<PlanNode>) -> Result<PlanNode> {
    match (inputs.pop(), inputs.is_empty()) {
        (Some(input), true) => Ok(input),
        _ => Err(Error::invalid_input(format!(
            "modify of {} must have exactly one input",
            entity
        ))),
    }
}

/// Allocate `count` identities, handing everything back on failure
fn allocate(source: &dyn IdentifierSource, count: usize) -> Result<Vec<i64>> {
    let mut ids = Vec::with_capacity(count);
    for _ in 0..count {
        match source.next_identifier() {
            Ok(id) => ids.push(id),
            Err(e) => {
                source.release_identifiers(&ids);
                return Err(e);
            }
        }
    }
    Ok(ids)
}

fn insert_identities(
    entity: &EntityRef,
    input: PlanNode,
    source: Arc<dyn IdentifierSource>,
    tag: Version,
    txn: &mut TransactionContext,
) -> Result<PlanNode> {
    let (id, op, inputs) = input.into_parts();
    let (op, ids) = match op {
        Operator::Values { fields, rows } => {
            let (fields, rows, ids) = stamp_rows(fields, rows, source.as_ref(), tag)?;
            (Operator::Values { fields, rows }, ids)
        }
        Operator::Documents { mut documents } => {
            ensure_documents(&documents)?;
            let ids = allocate(source.as_ref(), documents.len())?;
            for (document, &eid) in documents.iter_mut().zip(&ids) {
                stamp_document(document, eid, tag);
            }
            (Operator::Documents { documents }, ids)
        }
        Operator::GraphValues {
            mut nodes,
            mut edges,
        } => {
            ensure_documents(nodes.iter().chain(&edges))?;
            let ids = allocate(source.as_ref(), nodes.len() + edges.len())?;
            for (element, &eid) in nodes.iter_mut().chain(edges.iter_mut()).zip(&ids) {
                stamp_document(element, eid, tag);
            }
            (Operator::GraphValues { nodes, edges }, ids)
        }
        op => {
            let sink = CollectedIdentifiers::new();
            txn.attach_collector(entity, sink.clone(), CollectorRole::Allocated(source));
            let input = PlanNode::from_parts(id, op, inputs);
            return Ok(PlanNode::unary(
                Operator::AssignIdentifiers {
                    entity: entity.clone(),
                    version: tag,
                    sink,
                },
                input,
            ));
        }
    };

    txn.record_write(entity, ids.iter().copied());
    txn.reserve(source, ids);
    Ok(PlanNode::from_parts(id, op, inputs))
}

fn stamp_rows(
    mut fields: Vec<String>,
    mut rows: Vec<Vec<Value>>,
    source: &dyn IdentifierSource,
    tag: Version,
) -> Result<(Vec<String>, Vec<Vec<Value>>, Vec<i64>)> {
    if let Some(row) = rows.iter().find(|row| row.len() != fields.len()) {
        return Err(Error::invalid_input(format!(
            "literal row has {} values for {} fields",
            row.len(),
            fields.len()
        )));
    }

    let position = |key: &str| fields.iter().position(|f| f == key);
    let eid_at = position(IDENTIFIER_KEY);
    let vid_at = position(VERSION_KEY);
    for row in &rows {
        for at in [eid_at, vid_at].into_iter().flatten() {
            if !row[at].is_sentinel() {
                return Err(Error::reserved_field(fields[at].clone()));
            }
        }
    }

    let ids = allocate(source, rows.len())?;

    let eid_at = eid_at.unwrap_or_else(|| {
        fields.push(IDENTIFIER_KEY.to_string());
        rows.iter_mut().for_each(|row| row.push(Value::Null));
        fields.len() - 1
    });
    let vid_at = match vid_at {
        Some(at) => at,
        None => {
            fields.push(VERSION_KEY.to_string());
            rows.iter_mut().for_each(|row| row.push(Value::Null));
            fields.len() - 1
        }
    };
    for (row, &eid) in rows.iter_mut().zip(&ids) {
        row[eid_at] = Value::Int(eid);
        row[vid_at] = Value::Int(tag.as_i64());
    }
    Ok((fields, rows, ids))
}

fn ensure_documents<'a, I: IntoIterator<Item = &'a Value>>(values: I) -> Result<()> {
    match values.into_iter().find(|v| !matches!(v, Value::Document(_))) {
        Some(other) => Err(Error::invalid_input(format!(
            "expected a document, found {:?}",
            other
        ))),
        None => Ok(()),
    }
}

fn stamp_document(document: &mut Value, eid: i64, tag: Version) {
    if let Value::Document(fields) = document {
        fields.insert(IDENTIFIER_KEY.to_string(), Value::Int(eid));
        fields.insert(VERSION_KEY.to_string(), Value::Int(tag.as_i64()));
    }
}
