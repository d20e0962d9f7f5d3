//! Identifier collection
//!
//! Every UPDATE or DELETE on a multi-version entity gets an
//! [`Operator::IdentifierCollector`] directly under its modify node. The
//! executor records each `_eid` flowing into the write, and the transaction
//! reads the sink back at commit, so validation runs over the exact
//! identities written instead of the whole entity.

use crate::node::{ModifyOperation, Operator, PlanNode};
use tessera_concurrency::{CollectorRole, TransactionContext};
use tessera_core::CollectedIdentifiers;
use tracing::debug;

/// Insert collectors in front of every versioned UPDATE / DELETE
pub fn collect_identifiers(node: PlanNode, txn: &mut TransactionContext) -> PlanNode {
    let (id, op, inputs) = node.into_parts();
    let inputs: Vec<PlanNode> = inputs
        .into_iter()
        .map(|input| collect_identifiers(input, txn))
        .collect();

    let role = match &op {
        Operator::Modify {
            entity, operation, ..
        } if entity.mvcc => match operation {
            ModifyOperation::Update => Some((entity.clone(), CollectorRole::Written)),
            ModifyOperation::Delete => Some((entity.clone(), CollectorRole::Deleted)),
            ModifyOperation::Insert => None,
        },
        _ => None,
    };

    let Some((entity, role)) = role else {
        return PlanNode::from_parts(id, op, inputs);
    };

    let sink = CollectedIdentifiers::new();
    debug!(txn = %txn.txn_id, entity = %entity, ?role, "identifier collector inserted");
    txn.attach_collector(&entity, sink.clone(), role);
    let collected: Vec<PlanNode> = inputs
        .into_iter()
        .map(|input| {
            PlanNode::unary(
                Operator::IdentifierCollector {
                    entity: entity.clone(),
                    sink: sink.clone(),
                },
                input,
            )
        })
        .collect();
    PlanNode::from_parts(id, op, collected)
}
