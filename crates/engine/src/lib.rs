//! Engine integration for Tessera
//!
//! This crate wires the lower layers into one process-wide context:
//! - Context: allocator, entity registries, commit log, manager, rewriter, locks
//! - TesseraConfig: `tessera.toml` in the data directory
//! - LocalSequenceGenerator: in-process start / commit sequence
//!
//! The engine is the only component that knows about:
//! - The data directory and persisted allocator state
//! - Which identifier scope an entity draws from

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod context;
pub mod sequence;

pub use config::{TesseraConfig, CONFIG_FILE_NAME, DEFAULT_STATE_FILE};
pub use context::{Collaborators, Context};
pub use sequence::LocalSequenceGenerator;
