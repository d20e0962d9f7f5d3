//! Commit-time validation
//!
//! First-committer-wins over the write set: a transaction that started at
//! `start_seq` may commit only if no record it wrote has a committed version
//! newer than `start_seq`.
//!
//! Validation runs in two steps:
//! 1. The [`CommitInstantsLog`] is checked for every precisely known identity.
//!    A hit rejects the transaction without touching any backend.
//! 2. One query per written entity finds the maximum committed `_vid` among
//!    the written identities (or over the whole entity when the identities
//!    are not known). The maximum across entities is compared to `start_seq`.
//!
//! Validation never caches: both steps observe the state at the instant they
//! run.

use crate::commit_log::CommitInstantsLog;
use crate::statements;
use crate::write_set::{EntityWrites, WriteSet};
use tessera_core::{EntityIdentity, EntityRef, Error, QueryProcessor, Result, Value};
use tracing::{debug, warn};

/// A reason a transaction may not commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// The commit log recorded a newer commit of a written identity
    CommitLog {
        /// Conflicting identity
        identity: EntityIdentity,
        /// Commit sequence recorded for it
        committed: i64,
    },
    /// The backend holds a newer committed version in a written entity
    Entity {
        /// Conflicting entity
        entity: EntityRef,
        /// Largest committed version found
        max_committed: i64,
    },
}

impl ConflictType {
    /// Commit sequence that caused the conflict
    pub fn observed(&self) -> i64 {
        match self {
            ConflictType::CommitLog { committed, .. } => *committed,
            ConflictType::Entity { max_committed, .. } => *max_committed,
        }
    }
}

/// Outcome of validating one transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// Start sequence of the validated transaction
    pub start_seq: i64,
    /// Largest committed version observed across the write set
    pub max_committed: i64,
    /// Conflicts found; empty means the transaction may commit
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Passing result
    pub fn ok(start_seq: i64) -> Self {
        ValidationResult {
            start_seq,
            max_committed: 0,
            conflicts: Vec::new(),
        }
    }

    /// Whether the transaction may commit
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Fold another result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.max_committed = self.max_committed.max(other.max_committed);
        self.conflicts.extend(other.conflicts);
    }

    fn observe(&mut self, max_committed: i64) {
        self.max_committed = self.max_committed.max(max_committed);
    }
}

/// Fast path: compare the commit log against the precisely known identities
pub fn validate_commit_log(
    log: &CommitInstantsLog,
    write_set: &WriteSet,
    start_seq: i64,
) -> ValidationResult {
    let mut result = ValidationResult::ok(start_seq);
    let identities: Vec<EntityIdentity> = write_set.identities().collect();
    if let Some((identity, committed)) = log.newer_than(identities.iter(), start_seq) {
        result.observe(committed);
        result.conflicts.push(ConflictType::CommitLog {
            identity,
            committed,
        });
    }
    result
}

/// Backend check of one written entity
pub fn validate_entity(
    processor: &dyn QueryProcessor,
    writes: &EntityWrites,
    start_seq: i64,
) -> Result<ValidationResult> {
    let mut result = ValidationResult::ok(start_seq);
    if !writes.entity.mvcc || writes.has_no_known_entries() {
        return Ok(result);
    }

    let mut max_committed = 0;
    for request in statements::max_committed_version(writes) {
        let batch = processor.execute(&request).map_err(|e| {
            Error::backend_with_source(format!("validation of {}", writes.entity), e)
        })?;
        let observed = match batch.first_value() {
            None | Some(Value::Null) => 0,
            Some(value) => value.as_i64().ok_or_else(|| {
                Error::backend(format!(
                    "validation of {} returned a non-integer version: {:?}",
                    writes.entity, value
                ))
            })?,
        };
        max_committed = max_committed.max(observed);
    }

    result.observe(max_committed);
    if max_committed > start_seq {
        result.conflicts.push(ConflictType::Entity {
            entity: writes.entity.clone(),
            max_committed,
        });
    }
    Ok(result)
}

/// Validate a whole write set
///
/// Returns `Ok` with the detailed result; backend failures are returned as
/// `Err` and must abort the transaction.
pub fn validate_write_set(
    processor: &dyn QueryProcessor,
    log: &CommitInstantsLog,
    start_seq: i64,
    write_set: &WriteSet,
) -> Result<ValidationResult> {
    let fast = validate_commit_log(log, write_set, start_seq);
    if !fast.is_valid() {
        debug!(start_seq, observed = fast.max_committed, "conflict found in commit log");
        return Ok(fast);
    }

    let mut result = fast;
    for writes in write_set.entities() {
        result.merge(validate_entity(processor, writes, start_seq)?);
    }

    if !result.is_valid() {
        warn!(
            start_seq,
            observed = result.max_committed,
            conflicts = result.conflict_count(),
            "write conflict"
        );
    }
    Ok(result)
}

/// Whether a transaction that started at `start_seq` may commit `write_set`
pub fn validate(
    processor: &dyn QueryProcessor,
    log: &CommitInstantsLog,
    start_seq: i64,
    write_set: &WriteSet,
) -> Result<bool> {
    Ok(validate_write_set(processor, log, start_seq, write_set)?.is_valid())
}
