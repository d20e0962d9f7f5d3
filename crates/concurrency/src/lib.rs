//! Concurrency layer for Tessera
//!
//! This crate implements the optimistic, first-committer-wins protocol the
//! MVCC core runs on top of heterogeneous backends:
//! - CommitInstantsLog: last commit per record identity (validation fast path)
//! - Snapshot: the visibility rule for one reader
//! - WriteSet: entities and identities a transaction wrote
//! - statements: per-data-model templates for validate / publish / discard / supersede / scan
//! - validation / publish: the two halves of commit
//! - TransactionContext / TransactionManager: lifecycle and atomic commit
//! - LockableResource: shared / exclusive / MVCC acquisition

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod commit_log;
pub mod lock;
pub mod manager;
pub mod publish;
pub mod snapshot;
pub mod statements;
pub mod transaction;
pub mod validation;
pub mod write_set;

#[cfg(test)]
mod testing;

pub use commit_log::CommitInstantsLog;
pub use lock::{
    DeadlockDetector, DeadlockError, LockType, Lockable, LockableResource, NoDeadlockDetection,
    DEFAULT_LOCK_TIMEOUT,
};
pub use manager::TransactionManager;
pub use publish::publish_write_set;
pub use snapshot::{select_visible, Snapshot};
pub use transaction::{CollectorRole, CommitError, TransactionContext, TransactionStatus};
pub use validation::{validate, validate_write_set, ConflictType, ValidationResult};
pub use write_set::{EntityWrites, IdentifierScope, WriteSet};
