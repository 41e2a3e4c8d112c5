//! Test infrastructure for the query translation layer.
//!
//! Shared fixtures (a product catalog and facades over it) and assertion
//! helpers for rendered SQL.

#![allow(dead_code)]

pub mod assertions;
pub mod fixtures;

// Re-export commonly used items
pub use assertions::*;
pub use fixtures::*;
