//! Stepwise scenario-tree execution for multi-period energy-system models.
//!
//! The model horizon is split into steps. Each step may branch into the
//! scenario options of a catalog; every scenario's finalized results become
//! the initial conditions of its children at the next step. A scenario whose
//! solve leaves no output is voided, and so is everything below it.
//!
//! - **[`core`]**: Pure, deterministic logic (year planning, scenario paths,
//!   the node tree and its invariants). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (CSV tables, catalog loading, data
//!   preparation, finalization, solver and pipeline processes, run state).
//!
//! Orchestration modules ([`step`], [`plan`]) coordinate core logic with I/O
//! to implement CLI commands.

pub mod core;
pub mod errors;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod plan;
pub mod step;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
