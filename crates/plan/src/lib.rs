//! Plan rewriting for Tessera
//!
//! This crate turns ordinary statement plans into MVCC plans:
//! - node: the logical plan tree the rewriter works on
//! - collect: identifier collectors under versioned UPDATE / DELETE
//! - inject: identity allocation, reserved-field checks, versioned writes
//! - bound: snapshot bounding of versioned scans via deferred instructions
//! - rewriter: the ordered pipeline of all passes

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bound;
pub mod collect;
pub mod inject;
pub mod node;
pub mod rewriter;

pub use bound::{
    bound_to_snapshot, plan_instructions, DeferredInstruction, InstructionState, NativePlanner,
    QueryPlanner,
};
pub use collect::collect_identifiers;
pub use inject::{inject_identifiers, IdentifierSources, SharedIdentifiers};
pub use node::{
    BinaryOp, Expr, ModifyOperation, NodeId, Operator, PlanNode, PlanRoot, StatementKind,
};
pub use rewriter::PlanRewriter;
