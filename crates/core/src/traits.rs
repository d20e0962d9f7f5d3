//! Collaborator traits
//!
//! The MVCC core never talks to storage directly. These traits are the seams
//! to the rest of the engine:
//!
//! - [`QueryProcessor`]: prepares and executes generated statements
//! - [`SequenceGenerator`]: hands out start and commit sequence numbers
//! - [`UnassignedIdentifierScan`]: finds identifiers no live record uses
//! - [`IdentifierSource`]: anything that can allocate and take back identifiers

use crate::error::Result;
use crate::types::QueryLanguage;
use crate::value::RowBatch;

/// A statement emitted by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Language of `text`
    pub language: QueryLanguage,
    /// Statement text
    pub text: String,
    /// Namespace the statement runs in
    pub namespace: String,
    /// Internal statements may write reserved fields
    pub internal: bool,
}

impl QueryRequest {
    /// Create an internal statement
    pub fn internal(
        language: QueryLanguage,
        namespace: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        QueryRequest {
            language,
            text: text.into(),
            namespace: namespace.into(),
            internal: true,
        }
    }
}

/// An executable handle produced by [`QueryProcessor::prepare`]
pub trait PreparedQuery: Send {
    /// Execute and collect all result rows
    fn execute(&mut self) -> Result<RowBatch>;
}

/// Query-processing collaborator
///
/// Implementations parse the request in its native language and return an
/// executable handle, or a preparation error.
pub trait QueryProcessor: Send + Sync {
    /// Prepare a statement
    fn prepare(&self, request: &QueryRequest) -> Result<Box<dyn PreparedQuery>>;

    /// Prepare and execute in one step
    fn execute(&self, request: &QueryRequest) -> Result<RowBatch> {
        self.prepare(request)?.execute()
    }
}

/// Process-wide monotonic sequence generator
pub trait SequenceGenerator: Send + Sync {
    /// Take the next number; the order of calls is the global commit order
    fn next_number(&self) -> i64;

    /// Return a reserved but abandoned number
    fn release_number(&self, number: i64);
}

/// Storage scan for identifiers that exist in no live record
///
/// Used by the allocator once its counter reaches the configured bound.
pub trait UnassignedIdentifierScan: Send + Sync {
    /// Up to `limit` unused identifiers, smallest first
    fn unassigned_identifiers(&self, limit: usize) -> Result<Vec<i64>>;
}

/// Source of fresh identifiers for one scope
pub trait IdentifierSource: Send + Sync {
    /// Allocate one identifier
    fn next_identifier(&self) -> Result<i64>;

    /// Return identifiers that were reserved but never became visible
    fn release_identifiers(&self, ids: &[i64]);
}
