//! Transaction manager for coordinating commit operations
//!
//! Provides atomic commit by orchestrating:
//! 1. Validation (first-committer-wins, commit log then backend)
//! 2. Publication (retag provisional versions to the commit sequence)
//! 3. Commit log update (fast path for later validations)
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. collect_identifiers() - Drain collector sinks into the write set
//! 2. mark_validating() - Change state to Validating
//! 3. acquire commit lock
//! 4. validate_write_set() - Check for conflicts
//! 5. IF conflicts or backend error: rollback() and return error
//! 6. publish_write_set() - Take commit_seq, retag every entity
//! 7. IF publish failed: rollback() and return error
//! 8. record commits in the commit log, release commit lock
//! 9. mark_committed()
//! ```
//!
//! The commit lock makes validation and publication of one transaction
//! atomic with respect to every other commit, so the order in which commit
//! sequence numbers are taken is the order in which versions become visible.
//! `begin` takes its start sequence under the same lock: every commit
//! sequence below a snapshot is fully published before the snapshot exists.

use crate::commit_log::CommitInstantsLog;
use crate::publish::publish_write_set;
use crate::statements;
use crate::transaction::{CommitError, TransactionContext, TransactionStatus};
use crate::validation::validate_write_set;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tessera_core::{Error, QueryProcessor, Result, SequenceGenerator, TransactionId};
use tracing::{debug, info, warn};

/// Manages transaction lifecycle and atomic commits
pub struct TransactionManager {
    processor: Arc<dyn QueryProcessor>,
    sequences: Arc<dyn SequenceGenerator>,
    commit_log: Arc<CommitInstantsLog>,
    commit_lock: Mutex<()>,
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Create a manager over the given collaborators
    pub fn new(
        processor: Arc<dyn QueryProcessor>,
        sequences: Arc<dyn SequenceGenerator>,
        commit_log: Arc<CommitInstantsLog>,
    ) -> Self {
        TransactionManager {
            processor,
            sequences,
            commit_log,
            commit_lock: Mutex::new(()),
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Shared commit log
    pub fn commit_log(&self) -> &Arc<CommitInstantsLog> {
        &self.commit_log
    }

    /// Start a transaction at a fresh start sequence
    ///
    /// Waits for a publication in progress.
    pub fn begin(&self) -> TransactionContext {
        let txn_id = TransactionId(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let start_seq = {
            let _guard = self.commit_lock.lock();
            self.sequences.next_number()
        };
        debug!(txn = %txn_id, start_seq, "transaction started");
        TransactionContext::new(txn_id, start_seq)
    }

    /// Commit a transaction
    ///
    /// Returns the commit sequence, or `None` for a transaction that wrote
    /// nothing multi-versioned. On any error the transaction has already been
    /// rolled back.
    pub fn commit(&self, txn: &mut TransactionContext) -> std::result::Result<Option<i64>, CommitError> {
        if !txn.is_active() {
            return Err(CommitError::InvalidState(format!(
                "Cannot commit transaction {} from {:?} state - must be Active",
                txn.txn_id, txn.status
            )));
        }
        txn.collect_identifiers();

        if !txn.write_set().entities().any(|w| w.entity.mvcc) {
            txn.mark_validating()?;
            self.sequences.release_number(txn.start_seq);
            txn.mark_committed(None);
            debug!(txn = %txn.txn_id, start_seq = txn.start_seq, "read-only commit");
            return Ok(None);
        }

        txn.mark_validating()?;
        let guard = self.commit_lock.lock();

        let validation = match validate_write_set(
            self.processor.as_ref(),
            &self.commit_log,
            txn.start_seq,
            txn.write_set(),
        ) {
            Ok(result) => result,
            Err(e) => {
                drop(guard);
                self.abort(txn, &e.to_string());
                return Err(CommitError::Backend(e));
            }
        };

        if !validation.is_valid() {
            drop(guard);
            self.abort(txn, "write conflict");
            return Err(CommitError::ValidationFailed(validation));
        }

        let commit_seq = match publish_write_set(
            self.processor.as_ref(),
            self.sequences.as_ref(),
            txn.start_seq,
            txn.write_set(),
        ) {
            Ok(seq) => seq,
            Err(e) => {
                drop(guard);
                self.abort(txn, &e.to_string());
                return Err(CommitError::Backend(e));
            }
        };

        for writes in txn.write_set().entities().filter(|w| w.entity.mvcc) {
            let deleted = &writes.deleted;
            self.commit_log.record_commits(
                writes.identities().filter(|id| !deleted.contains(&id.entry_id)),
                commit_seq,
            );
            for &entry in deleted {
                self.commit_log.remove(&writes.entity.identity(entry));
            }
        }
        drop(guard);

        txn.mark_committed(Some(commit_seq));
        info!(txn = %txn.txn_id, start_seq = txn.start_seq, commit_seq, "transaction committed");
        Ok(Some(commit_seq))
    }

    /// Roll back a transaction that has not committed
    pub fn rollback(&self, txn: &mut TransactionContext) -> Result<()> {
        match txn.status {
            TransactionStatus::Active | TransactionStatus::Validating => {}
            TransactionStatus::Aborted { .. } => return Ok(()),
            TransactionStatus::Committed => {
                return Err(Error::invalid_state(format!(
                    "transaction {} is already committed",
                    txn.txn_id
                )))
            }
        }
        txn.collect_identifiers();
        self.abort(txn, "rolled back");
        Ok(())
    }

    /// Discard provisional versions, return reserved identifiers and end the transaction
    fn abort(&self, txn: &mut TransactionContext, reason: &str) {
        let mut discarded = true;
        for writes in txn.write_set().entities().filter(|w| w.entity.mvcc) {
            for request in statements::discard_statements(&writes.entity, txn.start_seq) {
                if let Err(e) = self.processor.execute(&request) {
                    warn!(
                        txn = %txn.txn_id,
                        start_seq = txn.start_seq,
                        entity = %writes.entity,
                        error = %e,
                        "discard of provisional versions failed"
                    );
                    discarded = false;
                }
            }
        }

        let released = txn.release_reserved();

        // Leftover rows still carry -start_seq; the number must stay taken
        if discarded {
            self.sequences.release_number(txn.start_seq);
        }

        txn.mark_aborted(reason);
        info!(
            txn = %txn.txn_id,
            start_seq = txn.start_seq,
            released,
            discarded,
            reason,
            "transaction aborted"
        );
    }
}
