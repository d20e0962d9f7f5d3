//! Concurrency Integration Tests
//!
//! First-committer-wins validation, snapshot isolation and rollback, run
//! end to end through a `Context` over an in-memory backend.

#[path = "../common/mod.rs"]
mod common;

mod first_committer_wins;
