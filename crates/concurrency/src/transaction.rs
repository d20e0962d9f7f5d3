//! Transaction context
//!
//! A [`TransactionContext`] carries everything the commit path needs about
//! one optimistic transaction:
//! - the start sequence (snapshot bound and provisional tag)
//! - the write set accumulated by rewritten statements
//! - identifiers reserved for its inserts, returned on rollback
//! - identifier sinks filled during execution by collector nodes
//!
//! ## State machine
//!
//! ```text
//! Active -> Validating -> Committed
//!   |           |
//!   +-----------+------> Aborted { reason }
//! ```

use crate::snapshot::Snapshot;
use crate::validation::ValidationResult;
use crate::write_set::WriteSet;
use std::fmt;
use std::sync::Arc;
use tessera_core::{
    CollectedIdentifiers, EntityRef, Error, IdentifierSource, TransactionId, Version,
};

/// Current state of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Executing statements
    Active,
    /// Commit in progress
    Validating,
    /// Published at a commit sequence number
    Committed,
    /// Rolled back
    Aborted {
        /// Why the transaction ended
        reason: String,
    },
}

/// Errors from the commit path
#[derive(Debug)]
pub enum CommitError {
    /// A newer committed version overlaps the write set
    ValidationFailed(ValidationResult),
    /// The transaction was not in a state that allows commit
    InvalidState(String),
    /// A generated statement failed during validation or publish
    Backend(Error),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitError::ValidationFailed(result) => write!(
                f,
                "Commit failed: {} conflict(s), observed commit {} after start {}",
                result.conflict_count(),
                result.max_committed,
                result.start_seq
            ),
            CommitError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            CommitError::Backend(e) => write!(f, "Backend failure during commit: {}", e),
        }
    }
}

impl std::error::Error for CommitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommitError::Backend(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommitError> for Error {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(result) => Error::WriteConflict {
                start_seq: result.start_seq,
                observed: result.max_committed,
            },
            CommitError::InvalidState(msg) => Error::InvalidState(msg),
            CommitError::Backend(e) => e,
        }
    }
}

/// What a collector sink records for its entity
#[derive(Clone)]
pub enum CollectorRole {
    /// Existing identities overwritten with a new version
    Written,
    /// Existing identities tombstoned
    Deleted,
    /// Fresh identities allocated from the source during execution
    Allocated(Arc<dyn IdentifierSource>),
}

impl fmt::Debug for CollectorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectorRole::Written => f.write_str("Written"),
            CollectorRole::Deleted => f.write_str("Deleted"),
            CollectorRole::Allocated(_) => f.write_str("Allocated"),
        }
    }
}

#[derive(Debug, Clone)]
struct Collector {
    entity: EntityRef,
    sink: CollectedIdentifiers,
    role: CollectorRole,
}

struct Reservation {
    source: Arc<dyn IdentifierSource>,
    ids: Vec<i64>,
}

/// State of one optimistic transaction
pub struct TransactionContext {
    /// Transaction id, used for locks and logs
    pub txn_id: TransactionId,
    /// Start sequence number
    pub start_seq: i64,
    /// Current state
    pub status: TransactionStatus,
    commit_seq: Option<i64>,
    write_set: WriteSet,
    reservations: Vec<Reservation>,
    collectors: Vec<Collector>,
}

impl TransactionContext {
    /// Create an active transaction
    pub fn new(txn_id: TransactionId, start_seq: i64) -> Self {
        TransactionContext {
            txn_id,
            start_seq,
            status: TransactionStatus::Active,
            commit_seq: None,
            write_set: WriteSet::new(),
            reservations: Vec::new(),
            collectors: Vec::new(),
        }
    }

    /// Read view of this transaction
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::for_transaction(self.start_seq)
    }

    /// Tag carried by this transaction's writes
    pub fn provisional_tag(&self) -> Version {
        Version::provisional(self.start_seq)
    }

    /// Commit sequence, once committed
    pub fn commit_seq(&self) -> Option<i64> {
        self.commit_seq
    }

    /// Whether the transaction still accepts statements
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Fail unless the transaction is active
    pub fn ensure_active(&self) -> tessera_core::Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(Error::invalid_state(format!(
                "transaction {} is {:?}, not Active",
                self.txn_id, self.status
            )))
        }
    }

    /// Accumulated write set
    pub fn write_set(&self) -> &WriteSet {
        &self.write_set
    }

    /// Record written identities
    pub fn record_write<I: IntoIterator<Item = i64>>(&mut self, entity: &EntityRef, entries: I) {
        self.write_set.record(entity, entries);
    }

    /// Record tombstoned identities
    pub fn record_delete<I: IntoIterator<Item = i64>>(&mut self, entity: &EntityRef, entries: I) {
        self.write_set.record_deleted(entity, entries);
    }

    /// Record a write whose identities are unknown
    pub fn record_entity_write(&mut self, entity: &EntityRef) {
        self.write_set.widen(entity);
    }

    /// Remember identifiers reserved from `source` for this transaction's inserts
    pub fn reserve(&mut self, source: Arc<dyn IdentifierSource>, ids: Vec<i64>) {
        if !ids.is_empty() {
            self.reservations.push(Reservation { source, ids });
        }
    }

    /// Number of identifiers reserved so far
    pub fn reserved_count(&self) -> usize {
        self.reservations.iter().map(|r| r.ids.len()).sum::<usize>()
            + self
                .collectors
                .iter()
                .filter(|c| matches!(c.role, CollectorRole::Allocated(_)))
                .map(|c| c.sink.len())
                .sum::<usize>()
    }

    /// Register a sink filled by a collector node during execution
    pub fn attach_collector(&mut self, entity: &EntityRef, sink: CollectedIdentifiers, role: CollectorRole) {
        self.write_set.add_entity(entity);
        self.collectors.push(Collector {
            entity: entity.clone(),
            sink,
            role,
        });
    }

    /// Move identities recorded by collector sinks into the write set
    ///
    /// Sinks stay attached, so allocated identities can still be released on
    /// rollback.
    pub fn collect_identifiers(&mut self) {
        for collector in &self.collectors {
            let ids = collector.sink.snapshot();
            match collector.role {
                CollectorRole::Deleted => self.write_set.record_deleted(&collector.entity, ids),
                CollectorRole::Written | CollectorRole::Allocated(_) => {
                    self.write_set.record(&collector.entity, ids)
                }
            }
        }
    }

    /// Give every reserved identifier back to its source
    pub fn release_reserved(&mut self) -> usize {
        let mut released = 0;
        for reservation in self.reservations.drain(..) {
            reservation.source.release_identifiers(&reservation.ids);
            released += reservation.ids.len();
        }
        for collector in &self.collectors {
            if let CollectorRole::Allocated(source) = &collector.role {
                let ids: Vec<i64> = collector.sink.snapshot().into_iter().collect();
                source.release_identifiers(&ids);
                released += ids.len();
            }
        }
        self.collectors.clear();
        released
    }

    /// Active -> Validating
    pub fn mark_validating(&mut self) -> Result<(), CommitError> {
        if !self.is_active() {
            return Err(CommitError::InvalidState(format!(
                "Cannot commit transaction {} from {:?} state - must be Active",
                self.txn_id, self.status
            )));
        }
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Validating -> Committed
    pub fn mark_committed(&mut self, commit_seq: Option<i64>) {
        self.commit_seq = commit_seq;
        self.status = TransactionStatus::Committed;
        self.reservations.clear();
        self.collectors.clear();
    }

    /// Any non-terminal state -> Aborted
    pub fn mark_aborted(&mut self, reason: impl Into<String>) {
        self.status = TransactionStatus::Aborted {
            reason: reason.into(),
        };
    }
}

impl fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_seq", &self.start_seq)
            .field("status", &self.status)
            .field("commit_seq", &self.commit_seq)
            .field("write_set", &self.write_set)
            .field("reserved", &self.reserved_count())
            .field("collectors", &self.collectors)
            .finish()
    }
}
