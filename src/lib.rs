//! Tessera - transaction identity and MVCC core for a federated database
//!
//! Tessera gives every logical record a stable identity (`_eid`), stamps every
//! write with a version (`_vid`) that says who wrote it and whether it is
//! committed, validates commits first-committer-wins, and rewrites statement
//! plans so every reader sees one consistent snapshot, whichever backend
//! (relational, document or graph) answers the query.
//!
//! # Quick Start
//!
//! ```ignore
//! use tessera::{Collaborators, Context};
//!
//! let context = Context::open("/path/to/data", Collaborators::new(processor))?;
//!
//! let mut txn = context.begin()?;
//! let plan = context.rewrite(plan, &mut txn)?;
//! // ... execute `plan` against the backend ...
//! context.commit(&mut txn)?;
//! ```
//!
//! # Architecture
//!
//! The [`Context`] is the entry point. The member crates stay reachable for
//! callers that assemble the pieces themselves.

pub use tessera_concurrency::{
    publish_write_set, select_visible, validate, validate_write_set, CollectorRole, CommitError,
    CommitInstantsLog, ConflictType, DeadlockDetector, DeadlockError, EntityWrites,
    IdentifierScope, LockType, Lockable, LockableResource, NoDeadlockDetection, Snapshot,
    TransactionContext, TransactionManager, TransactionStatus, ValidationResult, WriteSet,
};
pub use tessera_core::{
    CollectedIdentifiers, DataModel, EntityIdentity, EntityRef, Error, IdentifierSource,
    PreparedQuery, QueryLanguage, QueryProcessor, QueryRequest, Result, RowBatch,
    SequenceGenerator, TransactionId, UnassignedIdentifierScan, Value, Version,
    VersionedIdentity, IDENTIFIER_KEY, VERSION_KEY,
};
pub use tessera_engine::{Collaborators, Context, LocalSequenceGenerator, TesseraConfig};
pub use tessera_plan::{
    Expr, IdentifierSources, ModifyOperation, NativePlanner, Operator, PlanNode, PlanRewriter,
    PlanRoot, QueryPlanner, StatementKind,
};
pub use tessera_storage::{
    AllocatorOptions, EntityRegistries, FreeIntervalRegistry, IdentifierAllocator,
};

/// Member crates
pub mod crates {
    pub use tessera_concurrency as concurrency;
    pub use tessera_core as core;
    pub use tessera_engine as engine;
    pub use tessera_plan as plan;
    pub use tessera_storage as storage;
}
