//! In-process sequence generator
//!
//! Hands out strictly increasing numbers from an atomic counter. Numbers are
//! never reused: releasing one only records that nothing will ever be stamped
//! with it, which is what the transaction manager does for abandoned start
//! and commit sequences.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use tessera_core::SequenceGenerator;
use tracing::trace;

/// Monotonic counter plus the set of released numbers
#[derive(Debug, Default)]
pub struct LocalSequenceGenerator {
    base: i64,
    current: AtomicI64,
    released: Mutex<BTreeSet<i64>>,
}

impl LocalSequenceGenerator {
    /// Generator whose first number is 1
    pub fn new() -> Self {
        Self::starting_after(0)
    }

    /// Generator whose first number is `last + 1`
    pub fn starting_after(last: i64) -> Self {
        LocalSequenceGenerator {
            base: last,
            current: AtomicI64::new(last),
            released: Mutex::new(BTreeSet::new()),
        }
    }

    /// Last number handed out
    pub fn current(&self) -> i64 {
        self.current.load(Ordering::SeqCst)
    }

    /// Whether `number` was handed out and released again
    pub fn is_released(&self, number: i64) -> bool {
        self.released.lock().contains(&number)
    }

    /// Numbers handed out and not released
    pub fn outstanding(&self) -> usize {
        let handed_out = usize::try_from(self.current() - self.base).unwrap_or(0);
        handed_out.saturating_sub(self.released.lock().len())
    }
}

impl SequenceGenerator for LocalSequenceGenerator {
    fn next_number(&self) -> i64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn release_number(&self, number: i64) {
        if number <= self.base || number > self.current() {
            trace!(number, "ignoring release of a number never handed out");
            return;
        }
        self.released.lock().insert(number);
    }
}
