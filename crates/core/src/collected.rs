//! Shared sink for identities flowing into a modify node
//!
//! The plan rewriter inserts an identifier collector in front of every
//! UPDATE/DELETE on a multi-version entity. The executor records each
//! `_eid` that passes through it into a [`CollectedIdentifiers`] handle,
//! and the transaction reads the same handle back when building its write
//! set for validation.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Cloneable handle to a set of collected entry ids
#[derive(Clone, Default)]
pub struct CollectedIdentifiers {
    inner: Arc<Mutex<BTreeSet<i64>>>,
}

impl CollectedIdentifiers {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one entry id
    pub fn record(&self, entry_id: i64) {
        // Tombstones carry the negated identity
        self.inner.lock().insert(entry_id.abs());
    }

    /// Record several entry ids
    pub fn record_all<I: IntoIterator<Item = i64>>(&self, entry_ids: I) {
        let mut set = self.inner.lock();
        set.extend(entry_ids.into_iter().map(i64::abs));
    }

    /// Copy of the collected ids
    pub fn snapshot(&self) -> BTreeSet<i64> {
        self.inner.lock().clone()
    }

    /// Number of distinct ids recorded
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Whether two handles share the same sink
    pub fn same_sink(&self, other: &CollectedIdentifiers) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for CollectedIdentifiers {
    fn eq(&self, other: &Self) -> bool {
        self.same_sink(other)
    }
}

impl fmt::Debug for CollectedIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectedIdentifiers")
            .field("len", &self.len())
            .finish()
    }
}
