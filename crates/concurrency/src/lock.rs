//! Lockable resources
//!
//! Any resource (an entity, or a finer-grained range inside one) can be
//! acquired by a transaction under one of three disciplines:
//!
//! | held \ requested | Shared | Exclusive | Mvcc |
//! |---|---|---|---|
//! | Shared | yes | no | yes |
//! | Exclusive | no | no | no |
//! | Mvcc | yes | no | yes |
//!
//! Acquisition by a current holder is re-entrant; a stronger request from a
//! holder is an upgrade and is granted once the other holders allow it.
//! Before every wait the [`DeadlockDetector`] is consulted, and a wait that
//! outlives the configured timeout is reported as a deadlock.

use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_core::{Error, TransactionId};
use tracing::{debug, warn};

/// Default time a transaction waits for a lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5000);

/// Locking discipline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Readers
    Shared,
    /// A single writer
    Exclusive,
    /// Optimistic, non-blocking participants
    Mvcc,
}

impl LockType {
    /// Whether two holders with these types can coexist
    pub fn is_compatible_with(self, other: LockType) -> bool {
        !matches!(self, LockType::Exclusive) && !matches!(other, LockType::Exclusive)
    }

    fn strength(self) -> u8 {
        match self {
            LockType::Mvcc => 0,
            LockType::Shared => 1,
            LockType::Exclusive => 2,
        }
    }

    fn stronger(self, other: LockType) -> LockType {
        if other.strength() > self.strength() {
            other
        } else {
            self
        }
    }
}

/// Lock acquisition failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeadlockError {
    /// The detector found a wait-for cycle
    #[error("transaction {txn} would deadlock waiting for {resource}")]
    Cycle {
        /// The waiting transaction
        txn: TransactionId,
        /// Resource name
        resource: String,
    },
    /// The wait exceeded the lock timeout
    #[error("transaction {txn} timed out after {waited_ms} ms waiting for {resource}")]
    Timeout {
        /// The waiting transaction
        txn: TransactionId,
        /// Resource name
        resource: String,
        /// How long it waited
        waited_ms: u64,
    },
}

impl From<DeadlockError> for Error {
    fn from(e: DeadlockError) -> Self {
        Error::Deadlock(e.to_string())
    }
}

/// Wait-for analysis, supplied by the transaction controller
pub trait DeadlockDetector: Send + Sync {
    /// Called before `waiter` blocks on `holders`
    fn before_wait(
        &self,
        waiter: TransactionId,
        holders: &[TransactionId],
        resource: &str,
    ) -> Result<(), DeadlockError>;

    /// Called once `waiter` stopped waiting, granted or not
    fn after_wait(&self, _waiter: TransactionId) {}
}

/// Detector that never reports a cycle; only the timeout applies
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDeadlockDetection;

impl DeadlockDetector for NoDeadlockDetection {
    fn before_wait(&self, _: TransactionId, _: &[TransactionId], _: &str) -> Result<(), DeadlockError> {
        Ok(())
    }
}

/// Acquire/release capability
pub trait Lockable {
    /// Acquire under `lock_type`, blocking while incompatible holders exist
    fn acquire(&self, txn: TransactionId, lock_type: LockType) -> Result<(), DeadlockError>;

    /// Drop every hold of `txn`
    fn release(&self, txn: TransactionId);

    /// Whether the resource has no parent
    fn is_root(&self) -> bool;

    /// Whether any transaction holds the resource
    fn is_locked(&self) -> bool;

    /// Strongest type currently held
    fn lock_type(&self) -> Option<LockType>;
}

#[derive(Debug, Default)]
struct LockState {
    holders: BTreeMap<TransactionId, LockType>,
}

impl LockState {
    fn grantable(&self, txn: TransactionId, requested: LockType) -> bool {
        self.holders
            .iter()
            .filter(|(holder, _)| **holder != txn)
            .all(|(_, held)| held.is_compatible_with(requested))
    }

    fn lock_type(&self) -> Option<LockType> {
        self.holders.values().copied().reduce(LockType::stronger)
    }
}

/// A named resource with a holder set
pub struct LockableResource {
    name: String,
    parent: Option<Arc<LockableResource>>,
    state: Mutex<LockState>,
    changed: Condvar,
    detector: Arc<dyn DeadlockDetector>,
    timeout: Duration,
}

impl LockableResource {
    /// Create a root resource
    pub fn new(name: impl Into<String>) -> Self {
        LockableResource {
            name: name.into(),
            parent: None,
            state: Mutex::new(LockState::default()),
            changed: Condvar::new(),
            detector: Arc::new(NoDeadlockDetection),
            timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Create a resource nested inside `parent`
    pub fn child_of(name: impl Into<String>, parent: Arc<LockableResource>) -> Self {
        let mut resource = LockableResource::new(name);
        resource.detector = parent.detector.clone();
        resource.timeout = parent.timeout;
        resource.parent = Some(parent);
        resource
    }

    /// Use `detector` before every wait
    pub fn with_detector(mut self, detector: Arc<dyn DeadlockDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Give up waiting after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enclosing resource
    pub fn parent(&self) -> Option<&Arc<LockableResource>> {
        self.parent.as_ref()
    }

    /// Current holders
    pub fn holders(&self) -> Vec<TransactionId> {
        self.state.lock().holders.keys().copied().collect()
    }

    /// Whether `txn` currently holds the resource
    pub fn is_held_by(&self, txn: TransactionId) -> bool {
        self.state.lock().holders.contains_key(&txn)
    }
}

impl Lockable for LockableResource {
    fn acquire(&self, txn: TransactionId, lock_type: LockType) -> Result<(), DeadlockError> {
        let deadline = Instant::now() + self.timeout;
        let mut state = self.state.lock();
        let mut waited = false;

        loop {
            if state.grantable(txn, lock_type) {
                let granted = match state.holders.get(&txn) {
                    Some(held) => held.stronger(lock_type),
                    None => lock_type,
                };
                state.holders.insert(txn, granted);
                drop(state);
                if waited {
                    self.detector.after_wait(txn);
                }
                return Ok(());
            }

            let others: Vec<TransactionId> =
                state.holders.keys().copied().filter(|h| *h != txn).collect();
            if let Err(e) = self.detector.before_wait(txn, &others, &self.name) {
                warn!(txn = %txn, resource = %self.name, "deadlock detected");
                if waited {
                    self.detector.after_wait(txn);
                }
                return Err(e);
            }

            debug!(txn = %txn, resource = %self.name, ?lock_type, holders = others.len(), "waiting for lock");
            waited = true;
            if self.changed.wait_until(&mut state, deadline).timed_out()
                && !state.grantable(txn, lock_type)
            {
                drop(state);
                self.detector.after_wait(txn);
                warn!(txn = %txn, resource = %self.name, "lock wait timed out");
                return Err(DeadlockError::Timeout {
                    txn,
                    resource: self.name.clone(),
                    waited_ms: self.timeout.as_millis() as u64,
                });
            }
        }
    }

    fn release(&self, txn: TransactionId) {
        let mut state = self.state.lock();
        if state.holders.remove(&txn).is_some() {
            if state.holders.is_empty() {
                *state = LockState::default();
            }
            self.changed.notify_all();
        }
    }

    fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    fn is_locked(&self) -> bool {
        !self.state.lock().holders.is_empty()
    }

    fn lock_type(&self) -> Option<LockType> {
        self.state.lock().lock_type()
    }
}

impl fmt::Debug for LockableResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("LockableResource")
            .field("name", &self.name)
            .field("root", &self.parent.is_none())
            .field("holders", &state.holders)
            .finish()
    }
}
