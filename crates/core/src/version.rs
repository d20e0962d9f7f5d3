//! Version stamps for multi-version rows
//!
//! A version encodes write provenance in a single signed integer:
//!
//! - `> 0`: committed; the value is the global commit sequence number
//! - `< 0`: provisional; `-version` is the writer's start sequence number
//! - `== 0`: the "missing" sentinel, an identity slot without a version yet
//!
//! ## Visibility
//!
//! A reader with snapshot sequence `S` and provisional tag `-T` sees a row
//! when `0 < version <= S` or `version == -T`. Among the visible rows of one
//! identity only the one with the largest version is returned, where the
//! reader's own provisional row outranks every committed row.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Version stamp of a stored row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Version(i64);

impl Version {
    /// The "missing" sentinel
    pub const MISSING: Version = Version(0);

    /// Wrap a raw stored value
    pub const fn from_raw(raw: i64) -> Self {
        Version(raw)
    }

    /// Committed version for a commit sequence number
    pub const fn committed(commit_seq: i64) -> Self {
        Version(commit_seq)
    }

    /// Provisional tag for a writer that started at `start_seq`
    pub const fn provisional(start_seq: i64) -> Self {
        Version(-start_seq)
    }

    /// Raw stored value
    #[inline]
    pub const fn as_i64(&self) -> i64 {
        self.0
    }

    /// Whether this version has not been committed yet
    #[inline]
    pub const fn is_provisional(&self) -> bool {
        self.0 < 0
    }

    /// Whether this version is a committed one
    #[inline]
    pub const fn is_committed(&self) -> bool {
        self.0 > 0
    }

    /// Whether this is the missing sentinel
    #[inline]
    pub const fn is_missing(&self) -> bool {
        self.0 == 0
    }

    /// Start sequence of the writer for a provisional version
    pub const fn writer_start_seq(&self) -> Option<i64> {
        if self.is_provisional() {
            Some(-self.0)
        } else {
            None
        }
    }

    /// Evaluate the visibility rule for one row
    pub fn is_visible(&self, reader_snapshot_seq: i64, reader_own_provisional: Version) -> bool {
        if self.is_committed() {
            return self.0 <= reader_snapshot_seq;
        }
        self.is_provisional() && *self == reader_own_provisional
    }

    /// Rank two versions that are both visible to the same reader
    ///
    /// Provisional versions outrank committed ones (a reader only ever sees
    /// its own), committed versions compare by commit sequence.
    pub fn visibility_cmp(&self, other: &Version) -> Ordering {
        match (self.is_provisional(), other.is_provisional()) {
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            _ => self.0.cmp(&other.0),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_provisional() {
            write!(f, "provisional({})", -self.0)
        } else if self.is_missing() {
            f.write_str("missing")
        } else {
            write!(f, "v{}", self.0)
        }
    }
}

/// Tag a write made by a transaction started at `start_seq`
pub const fn tag_provisional(start_seq: i64) -> Version {
    Version::provisional(start_seq)
}

/// Whether a raw stored version is provisional
pub const fn is_provisional(version: i64) -> bool {
    version < 0
}

/// Visibility rule on raw stored values
pub fn is_visible(version: i64, reader_snapshot_seq: i64, reader_own_provisional: i64) -> bool {
    Version::from_raw(version).is_visible(
        reader_snapshot_seq,
        Version::from_raw(reader_own_provisional),
    )
}
