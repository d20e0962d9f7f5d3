//! Identity and entity types
//!
//! This module defines the foundational identifiers used throughout the system:
//! - EntityIdentity: one logical record inside one entity, stable across versions
//! - VersionedIdentity: an identity plus the version that wrote it
//! - DataModel: the three backend data models (tabular, document, graph)
//! - EntityRef: an entity as seen by the rewriter and the commit path
//! - TransactionId: reference used by lock holders

use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Catalog identifier of an entity (table, collection or graph)
pub type EntityId = i64;

/// Identifier of a transaction, used as a lock-holder reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Identity of one logical record, independent of its versions
///
/// `entry_id` is unique within its entity for the record's entire lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityIdentity {
    /// Owning entity
    pub entity_id: EntityId,
    /// Record identifier within the entity
    pub entry_id: i64,
}

impl EntityIdentity {
    /// Create a new identity
    pub const fn new(entity_id: EntityId, entry_id: i64) -> Self {
        EntityIdentity {
            entity_id,
            entry_id,
        }
    }

    /// Attach a version to this identity
    pub const fn with_version(self, version: Version) -> VersionedIdentity {
        VersionedIdentity {
            identity: self,
            version,
        }
    }
}

impl fmt::Display for EntityIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}:{})", self.entity_id, self.entry_id)
    }
}

/// An identity together with the version that wrote it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionedIdentity {
    /// The logical record
    pub identity: EntityIdentity,
    /// Write provenance of this row
    pub version: Version,
}

impl VersionedIdentity {
    /// Create a versioned identity from raw parts
    pub const fn new(entity_id: EntityId, entry_id: i64, version: Version) -> Self {
        VersionedIdentity {
            identity: EntityIdentity::new(entity_id, entry_id),
            version,
        }
    }

    /// Entity the row belongs to
    pub const fn entity_id(&self) -> EntityId {
        self.identity.entity_id
    }

    /// Record identifier of the row
    pub const fn entry_id(&self) -> i64 {
        self.identity.entry_id
    }
}

/// Data model of a backend entity
///
/// Every place that needs a per-model query template matches this enum
/// exhaustively, so a new model is a compile error until all templates exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataModel {
    /// Tables queried with SQL
    Relational,
    /// Collections queried with MQL
    Document,
    /// Property graphs queried with Cypher
    Graph,
}

impl DataModel {
    /// Native query language of this data model
    pub const fn language(&self) -> QueryLanguage {
        match self {
            DataModel::Relational => QueryLanguage::Sql,
            DataModel::Document => QueryLanguage::Mql,
            DataModel::Graph => QueryLanguage::Cypher,
        }
    }
}

impl fmt::Display for DataModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataModel::Relational => "relational",
            DataModel::Document => "document",
            DataModel::Graph => "graph",
        };
        f.write_str(name)
    }
}

/// Query language understood by the query-processing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryLanguage {
    /// SQL
    Sql,
    /// MongoDB query language
    Mql,
    /// Cypher
    Cypher,
}

impl fmt::Display for QueryLanguage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            QueryLanguage::Sql => "sql",
            QueryLanguage::Mql => "mql",
            QueryLanguage::Cypher => "cypher",
        };
        f.write_str(name)
    }
}

/// An entity as referenced from plans and write sets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Catalog id
    pub id: EntityId,
    /// Owning namespace name
    pub namespace: String,
    /// Entity name inside the namespace
    pub name: String,
    /// Backend data model
    pub model: DataModel,
    /// Whether the owning namespace uses multi-version concurrency control
    pub mvcc: bool,
}

impl EntityRef {
    /// Create a reference to a multi-version entity
    pub fn new(
        id: EntityId,
        namespace: impl Into<String>,
        name: impl Into<String>,
        model: DataModel,
    ) -> Self {
        EntityRef {
            id,
            namespace: namespace.into(),
            name: name.into(),
            model,
            mvcc: true,
        }
    }

    /// Mark the entity as living in a namespace without MVCC
    pub fn without_mvcc(mut self) -> Self {
        self.mvcc = false;
        self
    }

    /// Identity of a record inside this entity
    pub fn identity(&self, entry_id: i64) -> EntityIdentity {
        EntityIdentity::new(self.id, entry_id)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}
