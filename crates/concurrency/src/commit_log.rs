//! Commit instants log
//!
//! Process-wide map from record identity to the last commit sequence number
//! that touched it. Validation consults it before querying any backend, so a
//! conflict with a transaction committed through this process is detected
//! without a round trip.
//!
//! Every call takes the log mutex for the duration of one map operation only.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tessera_core::EntityIdentity;

/// Last known commit per identity
#[derive(Default)]
pub struct CommitInstantsLog {
    instants: Mutex<FxHashMap<EntityIdentity, i64>>,
}

impl CommitInstantsLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `identity` was committed at `commit_seq`
    ///
    /// Keeps the larger of the stored and the new value.
    pub fn record_commit(&self, identity: EntityIdentity, commit_seq: i64) {
        let mut instants = self.instants.lock();
        let entry = instants.entry(identity).or_insert(commit_seq);
        if *entry < commit_seq {
            *entry = commit_seq;
        }
    }

    /// Record one commit for many identities under a single lock acquisition
    pub fn record_commits<I>(&self, identities: I, commit_seq: i64)
    where
        I: IntoIterator<Item = EntityIdentity>,
    {
        let mut instants = self.instants.lock();
        for identity in identities {
            let entry = instants.entry(identity).or_insert(commit_seq);
            if *entry < commit_seq {
                *entry = commit_seq;
            }
        }
    }

    /// Last commit of `identity`, if one was recorded
    pub fn last_commit(&self, identity: &EntityIdentity) -> Option<i64> {
        self.instants.lock().get(identity).copied()
    }

    /// Forget a deleted identity
    pub fn remove(&self, identity: &EntityIdentity) -> Option<i64> {
        self.instants.lock().remove(identity)
    }

    /// First identity whose last commit is newer than `start_seq`
    pub fn newer_than<'a, I>(&self, identities: I, start_seq: i64) -> Option<(EntityIdentity, i64)>
    where
        I: IntoIterator<Item = &'a EntityIdentity>,
    {
        let instants = self.instants.lock();
        identities.into_iter().find_map(|identity| {
            instants
                .get(identity)
                .filter(|&&seq| seq > start_seq)
                .map(|&seq| (*identity, seq))
        })
    }

    /// Number of tracked identities
    pub fn len(&self) -> usize {
        self.instants.lock().len()
    }

    /// Whether no identity is tracked
    pub fn is_empty(&self) -> bool {
        self.instants.lock().is_empty()
    }
}
