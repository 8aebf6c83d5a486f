//! Stable exit codes for stepwise CLI commands.

/// Command succeeded; for `run`, every scenario was solved.
pub const OK: i32 = 0;
/// Invalid configuration, catalog or input data, or another fatal error.
pub const INVALID: i32 = 1;
/// `stepwise run` completed but at least one scenario ended void.
pub const VOIDED: i32 = 2;
