//! Snapshot visibility
//!
//! A [`Snapshot`] is what a reader sees: every committed version up to its
//! snapshot sequence, plus its own provisional writes. Backends apply the
//! rule through the rewritten scans (see `statements::snapshot_scan`);
//! [`select_visible`] applies the very same rule to rows already in memory.
//!
//! **What a snapshot ALWAYS provides**:
//! - At most one version per identity
//! - The reader's own provisional writes
//!
//! **What a snapshot NEVER shows**:
//! - Versions committed after the snapshot sequence
//! - Provisional versions of other transactions
//! - Records whose visible version is a tombstone (negated `_eid`)

use std::collections::BTreeMap;
use tessera_core::{EntityIdentity, Version, VersionedIdentity};

/// Read view of one transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    sequence: i64,
    own_tag: Version,
}

impl Snapshot {
    /// Snapshot at `sequence` for a reader whose writes carry `own_tag`
    pub fn new(sequence: i64, own_tag: Version) -> Self {
        Snapshot { sequence, own_tag }
    }

    /// Snapshot of a transaction that started at `start_seq`
    pub fn for_transaction(start_seq: i64) -> Self {
        Snapshot {
            sequence: start_seq,
            own_tag: Version::provisional(start_seq),
        }
    }

    /// Largest committed version visible
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Provisional tag of the reader's own writes
    pub fn own_tag(&self) -> Version {
        self.own_tag
    }

    /// Visibility of a single version
    pub fn can_see(&self, version: Version) -> bool {
        version.is_visible(self.sequence, self.own_tag)
    }
}

/// Reduce stored rows to the ones visible in `snapshot`
///
/// Rows are grouped by `(entity, |entry_id|)`; the visible row with the
/// highest rank wins, and identities whose winner is a tombstone are dropped.
/// Writers keep at most one row per identity and version, so the winner is
/// unique. The result is ordered by identity.
pub fn select_visible<I>(rows: I, snapshot: &Snapshot) -> Vec<VersionedIdentity>
where
    I: IntoIterator<Item = VersionedIdentity>,
{
    let mut winners: BTreeMap<EntityIdentity, VersionedIdentity> = BTreeMap::new();

    for row in rows {
        if !snapshot.can_see(row.version) {
            continue;
        }
        let key = EntityIdentity::new(row.entity_id(), row.entry_id().abs());
        match winners.get(&key) {
            Some(current) if current.version.visibility_cmp(&row.version).is_ge() => {}
            _ => {
                winners.insert(key, row);
            }
        }
    }

    winners
        .into_values()
        .filter(|row| row.entry_id() > 0)
        .collect()
}
