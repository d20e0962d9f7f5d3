//! Write sets
//!
//! The set of entities a transaction wrote, each with the identities it
//! touched. Identities are known precisely when the rewriter injected them
//! or an identifier collector recorded them; otherwise the whole entity is
//! the unit of conflict detection.

use std::collections::{BTreeMap, BTreeSet};
use tessera_core::{EntityId, EntityIdentity, EntityRef};

/// Granularity of the identities written in one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentifierScope {
    /// Any record of the entity may have been written
    Entity,
    /// Exactly these entry ids were written
    Entries(BTreeSet<i64>),
}

impl IdentifierScope {
    /// Precise entry ids, if known
    pub fn entries(&self) -> Option<&BTreeSet<i64>> {
        match self {
            IdentifierScope::Entity => None,
            IdentifierScope::Entries(ids) => Some(ids),
        }
    }
}

/// Writes of one transaction to one entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityWrites {
    /// The written entity
    pub entity: EntityRef,
    /// Identities written
    pub scope: IdentifierScope,
    /// Entry ids deleted (tombstoned); also contained in `scope`
    pub deleted: BTreeSet<i64>,
}

impl EntityWrites {
    fn new(entity: EntityRef) -> Self {
        EntityWrites {
            entity,
            scope: IdentifierScope::Entries(BTreeSet::new()),
            deleted: BTreeSet::new(),
        }
    }

    /// Whether a precise scope is empty (nothing to validate)
    pub fn has_no_known_entries(&self) -> bool {
        matches!(&self.scope, IdentifierScope::Entries(ids) if ids.is_empty())
    }

    /// Precise identities written
    pub fn identities(&self) -> impl Iterator<Item = EntityIdentity> + '_ {
        let entity_id = self.entity.id;
        self.scope
            .entries()
            .into_iter()
            .flatten()
            .map(move |&entry| EntityIdentity::new(entity_id, entry))
    }
}

/// All writes of one transaction, keyed by entity id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSet {
    entities: BTreeMap<EntityId, EntityWrites>,
}

impl WriteSet {
    /// Create an empty write set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity as written
    pub fn add_entity(&mut self, entity: &EntityRef) -> &mut EntityWrites {
        self.entities
            .entry(entity.id)
            .or_insert_with(|| EntityWrites::new(entity.clone()))
    }

    /// Record written entry ids
    pub fn record<I: IntoIterator<Item = i64>>(&mut self, entity: &EntityRef, entries: I) {
        let writes = self.add_entity(entity);
        if let IdentifierScope::Entries(ids) = &mut writes.scope {
            ids.extend(entries.into_iter().map(i64::abs));
        }
    }

    /// Record deleted entry ids
    pub fn record_deleted<I: IntoIterator<Item = i64>>(&mut self, entity: &EntityRef, entries: I) {
        let entries: Vec<i64> = entries.into_iter().map(i64::abs).collect();
        self.add_entity(entity).deleted.extend(entries.iter().copied());
        self.record(entity, entries);
    }

    /// Fall back to whole-entity granularity
    pub fn widen(&mut self, entity: &EntityRef) {
        self.add_entity(entity).scope = IdentifierScope::Entity;
    }

    /// Merge another write set into this one
    pub fn merge(&mut self, other: WriteSet) {
        for (_, writes) in other.entities {
            match writes.scope {
                IdentifierScope::Entity => self.widen(&writes.entity),
                IdentifierScope::Entries(ids) => self.record(&writes.entity, ids),
            }
            self.add_entity(&writes.entity).deleted.extend(writes.deleted);
        }
    }

    /// Writes per entity, ordered by entity id
    pub fn entities(&self) -> impl Iterator<Item = &EntityWrites> {
        self.entities.values()
    }

    /// Writes to one entity
    pub fn get(&self, entity: EntityId) -> Option<&EntityWrites> {
        self.entities.get(&entity)
    }

    /// All precisely known identities
    pub fn identities(&self) -> impl Iterator<Item = EntityIdentity> + '_ {
        self.entities.values().flat_map(EntityWrites::identities)
    }

    /// Number of written entities
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing was written
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
