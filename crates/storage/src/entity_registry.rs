//! Entity-scoped identifier lifecycles
//!
//! Each multi-version entity owns one [`FreeIntervalRegistry`] over
//! `[1, max_identifier)`. Registries are created lazily on first use and
//! dropped together with their entity.

use crate::registry::FreeIntervalRegistry;
use dashmap::DashMap;
use std::sync::Arc;
use tessera_core::{EntityId, Result};
use tracing::debug;

/// Per-entity free-interval registries
pub struct EntityRegistries {
    max_identifier: i64,
    registries: DashMap<EntityId, Arc<FreeIntervalRegistry>>,
}

impl EntityRegistries {
    /// Create an empty set of registries for identifiers below `max_identifier`
    pub fn new(max_identifier: i64) -> Self {
        EntityRegistries {
            max_identifier,
            registries: DashMap::new(),
        }
    }

    /// Registry of one entity, created on first access
    ///
    /// The returned handle implements [`tessera_core::IdentifierSource`], so it
    /// can be handed to the rewriter in place of the global allocator.
    pub fn scoped(&self, entity: EntityId) -> Arc<FreeIntervalRegistry> {
        self.registries
            .entry(entity)
            .or_insert_with(|| {
                debug!(entity, max = self.max_identifier, "Creating entity identifier registry");
                Arc::new(FreeIntervalRegistry::new(
                    format!("entity {}", entity),
                    1,
                    self.max_identifier,
                ))
            })
            .clone()
    }

    /// Take the next entry id of an entity
    pub fn take_next(&self, entity: EntityId) -> Result<i64> {
        self.scoped(entity).take_next()
    }

    /// Return entry ids of permanently deleted records
    pub fn release(&self, entity: EntityId, ids: &[i64]) {
        self.scoped(entity).release(ids.iter().copied());
    }

    /// Forget the registry of a dropped entity
    pub fn drop_entity(&self, entity: EntityId) -> bool {
        self.registries.remove(&entity).is_some()
    }

    /// Number of entities with a registry
    pub fn len(&self) -> usize {
        self.registries.len()
    }

    /// Whether no registry exists yet
    pub fn is_empty(&self) -> bool {
        self.registries.is_empty()
    }
}
