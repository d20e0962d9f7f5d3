//! Identifier storage for Tessera
//!
//! This crate owns the identifier spaces of the MVCC core:
//! - FreeIntervalRegistry: coalescing free list over one identifier scope
//! - EntityRegistries: one registry per multi-version entity
//! - IdentifierAllocator: global prefetching allocator with scan-mode fallback
//! - AllocatorState: the persisted counter / scan-mode record

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod allocator;
pub mod allocator_state;
pub mod entity_registry;
pub mod registry;

pub use allocator::{AllocatorOptions, IdentifierAllocator, DEFAULT_MAX_IDENTIFIER, DEFAULT_QUEUE_SIZE};
pub use allocator_state::AllocatorState;
pub use entity_registry::EntityRegistries;
pub use registry::FreeIntervalRegistry;
