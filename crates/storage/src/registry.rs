//! Free-interval registry
//!
//! A coalescing free list over an integer identifier space. Free values are
//! kept as disjoint, non-adjacent, half-open intervals `[lower, upper)` in a
//! `BTreeMap` keyed by `lower`, which gives logarithmic floor/ceiling lookup.
//!
//! ## Invariants
//!
//! - Intervals never overlap and never touch; adjacent intervals are merged
//! - `take_next` always returns the smallest free value
//! - Each call holds the registry mutex only for the structural mutation
//!
//! ```text
//! free: [1,10)  take x5  -> [6,10)
//! release {3,4}          -> [3,5) [6,10)
//! release {5}            -> [3,10)
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::ops::Bound;
use tessera_core::{Error, IdentifierSource, Result};
use tracing::warn;

/// Coalescing free list for one identifier scope
pub struct FreeIntervalRegistry {
    /// Scope name used in errors and logs
    scope: String,
    /// lower -> upper (exclusive)
    intervals: Mutex<BTreeMap<i64, i64>>,
}

impl FreeIntervalRegistry {
    /// Registry with every value in `[lower, upper)` free
    pub fn new(scope: impl Into<String>, lower: i64, upper: i64) -> Self {
        let mut intervals = BTreeMap::new();
        if lower < upper {
            intervals.insert(lower, upper);
        }
        FreeIntervalRegistry {
            scope: scope.into(),
            intervals: Mutex::new(intervals),
        }
    }

    /// Registry with no free values
    pub fn empty(scope: impl Into<String>) -> Self {
        FreeIntervalRegistry {
            scope: scope.into(),
            intervals: Mutex::new(BTreeMap::new()),
        }
    }

    /// Scope name
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Take the smallest free value
    ///
    /// # Errors
    ///
    /// `Error::Exhausted` if no value is free. Callers must never request
    /// more identifiers than the configured space allows.
    pub fn take_next(&self) -> Result<i64> {
        let mut intervals = self.intervals.lock();
        loop {
            let Some((&lower, &upper)) = intervals.iter().next() else {
                return Err(Error::exhausted(self.scope.clone()));
            };
            intervals.remove(&lower);
            if lower >= upper {
                continue;
            }
            if lower + 1 < upper {
                intervals.insert(lower + 1, upper);
            }
            return Ok(lower);
        }
    }

    /// Return values to the free list, merging with neighbouring intervals
    pub fn release<I>(&self, ids: I)
    where
        I: IntoIterator<Item = i64>,
    {
        let mut intervals = self.intervals.lock();
        for id in ids {
            Self::release_one(&mut intervals, id, &self.scope);
        }
    }

    fn release_one(intervals: &mut BTreeMap<i64, i64>, id: i64, scope: &str) {
        // A half-open interval cannot end past i64::MAX
        let Some(next) = id.checked_add(1) else {
            warn!(scope, id, "Released identifier has no representable interval");
            return;
        };
        let floor = intervals
            .range((Bound::Unbounded, Bound::Included(id)))
            .next_back()
            .map(|(&l, &u)| (l, u));
        let ceiling = intervals
            .range((Bound::Excluded(id), Bound::Unbounded))
            .next()
            .map(|(&l, &u)| (l, u));

        if let Some((lower, upper)) = floor {
            if id < upper {
                warn!(scope, id, lower, upper, "Released identifier is already free");
                return;
            }
        }

        let mut merged_left = false;
        if let Some((lower, upper)) = floor {
            if upper == id {
                intervals.insert(lower, next);
                merged_left = true;
            }
        }

        match ceiling {
            Some((upper_lower, upper_upper)) if upper_lower == next => {
                intervals.remove(&upper_lower);
                match floor {
                    Some((lower, _)) if merged_left => {
                        intervals.insert(lower, upper_upper);
                    }
                    _ => {
                        intervals.insert(id, upper_upper);
                    }
                }
            }
            _ if !merged_left => {
                intervals.insert(id, next);
            }
            _ => {}
        }
    }

    /// Whether a value is currently free
    pub fn contains(&self, id: i64) -> bool {
        let intervals = self.intervals.lock();
        intervals
            .range((Bound::Unbounded, Bound::Included(id)))
            .next_back()
            .map_or(false, |(_, &upper)| id < upper)
    }

    /// Whether no value is free
    pub fn is_empty(&self) -> bool {
        self.intervals.lock().iter().all(|(l, u)| l >= u)
    }

    /// Copy of the current intervals, ordered by lower bound
    pub fn intervals(&self) -> Vec<(i64, i64)> {
        self.intervals
            .lock()
            .iter()
            .filter(|(l, u)| l < u)
            .map(|(&l, &u)| (l, u))
            .collect()
    }

    /// Number of free values
    pub fn free_count(&self) -> u64 {
        self.intervals
            .lock()
            .iter()
            .map(|(&l, &u)| if u > l { (u - l) as u64 } else { 0 })
            .sum()
    }
}

impl IdentifierSource for FreeIntervalRegistry {
    fn next_identifier(&self) -> Result<i64> {
        self.take_next()
    }

    fn release_identifiers(&self, ids: &[i64]) {
        self.release(ids.iter().copied());
    }
}

impl std::fmt::Debug for FreeIntervalRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FreeIntervalRegistry")
            .field("scope", &self.scope)
            .field("intervals", &self.intervals())
            .finish()
    }
}
