//! Rewrite Integration Tests
//!
//! The full plan rewriting pipeline across the three data models.

#[path = "../common/mod.rs"]
mod common;

mod models;
mod pipeline;
