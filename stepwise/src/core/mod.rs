//! Deterministic, pure logic for the scenario tree.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod invariants;
pub mod layout;
pub mod plan;
pub mod scenario_path;
pub mod tree;
pub mod types;
