//! Model input data: reading the horizon and splitting per-step base datasets.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::errors::ConfigurationError;
use crate::io::dirs::reset_dir;
use crate::io::table::{Table, VALUE_COLUMN, csv_files, parse_year};

/// The otoole set file listing every model year.
pub const YEAR_SET_FILE: &str = "YEAR.csv";

/// Read the model horizon from `YEAR.csv` (sorted, de-duplicated).
pub fn read_horizon(input_dir: &Path) -> Result<Vec<u32>> {
    let path = input_dir.join(YEAR_SET_FILE);
    if !path.is_file() {
        return Err(ConfigurationError::new(format!(
            "input data {} has no {YEAR_SET_FILE}",
            input_dir.display()
        ))
        .into());
    }
    let table = Table::read(&path)?;
    let idx = table.column(VALUE_COLUMN).ok_or_else(|| {
        ConfigurationError::new(format!("{} has no {VALUE_COLUMN} column", path.display()))
    })?;
    let mut years = table
        .rows
        .iter()
        .map(|row| parse_year(&row[idx]))
        .collect::<Result<Vec<_>>>()
        .map_err(|err| ConfigurationError::new(format!("{}: {err:#}", path.display())))?;
    years.sort_unstable();
    years.dedup();
    if years.is_empty() {
        return Err(ConfigurationError::new(format!("{} lists no years", path.display())).into());
    }
    Ok(years)
}

/// Write the base dataset for one step, restricted to `window` years.
///
/// Tables with a `YEAR` column keep only window rows, `YEAR.csv` keeps only
/// window years, every other file is copied verbatim. Returns the number of
/// tables written.
#[instrument(skip_all, fields(input = %input_dir.display(), base = %base_dir.display()))]
pub fn write_step_base(input_dir: &Path, base_dir: &Path, window: &[u32]) -> Result<usize> {
    reset_dir(base_dir)?;
    let mut written = 0;
    for path in csv_files(input_dir)? {
        let name = path
            .file_name()
            .with_context(|| format!("file name of {}", path.display()))?;
        let target = base_dir.join(name);
        let mut table = Table::read(&path)?;
        let filtered = if name == YEAR_SET_FILE {
            table.retain_years_in(VALUE_COLUMN, window)?
        } else {
            table.retain_years(window)?
        };
        if filtered {
            table.write(&target)?;
        } else {
            fs::copy(&path, &target)
                .with_context(|| format!("copy {} -> {}", path.display(), target.display()))?;
        }
        written += 1;
    }
    debug!(written, years = window.len(), "step base written");
    Ok(written)
}
