//! Tracing setup for stepwise runs.
//!
//! Two sinks share one `EnvFilter`:
//!
//! - **stderr**: compact, human-oriented progress.
//! - **log file** (optional, `<results_root>/stepwise.log` by default): the same
//!   events without ANSI colors, appended across runs.
//!
//! Solver stdout/stderr are not routed through tracing; they are written to
//! per-node `solve.log` files next to the node's artifacts.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::io::dirs::ensure_dir;

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`. Defaults to `stepwise=info` if unset.
///
/// # Example
/// ```bash
/// RUST_LOG=stepwise=debug stepwise run --input-data data/utopia --step-length 5
/// ```
pub fn init(log_file: Option<&Path>) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stepwise=info"));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                ensure_dir(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;
    Ok(())
}
