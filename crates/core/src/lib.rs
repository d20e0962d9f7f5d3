//! Core types and traits for Tessera
//!
//! This crate defines the foundational types used throughout the system:
//! - EntityIdentity / VersionedIdentity: record identity and write provenance
//! - Version: committed / provisional / missing version stamps
//! - DataModel, EntityRef: the federated entities the core rewrites for
//! - Reserved fields: `_eid` and `_vid`
//! - Value, RowBatch: typed rows returned by the query collaborator
//! - Error: Error type hierarchy
//! - Traits: collaborator boundaries (query processing, sequences, scans)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collected;
pub mod error;
pub mod reserved;
pub mod traits;
pub mod types;
pub mod value;
pub mod version;

pub use collected::CollectedIdentifiers;
pub use error::{Error, Result};
pub use reserved::{IDENTIFIER_KEY, VERSION_KEY};
pub use traits::{
    IdentifierSource, PreparedQuery, QueryProcessor, QueryRequest, SequenceGenerator,
    UnassignedIdentifierScan,
};
pub use types::{
    DataModel, EntityId, EntityIdentity, EntityRef, QueryLanguage, TransactionId,
    VersionedIdentity,
};
pub use value::{RowBatch, Value};
pub use version::Version;
