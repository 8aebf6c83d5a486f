//! Turning a solved node's raw output into its step-scoped final result.
//!
//! The final result of a node is cumulative: the parent's final tables with
//! this step's years appended. Look-ahead years in the raw output are dropped,
//! since the next step re-solves them.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::io::dirs::reset_dir;
use crate::io::table::{Table, YEAR_COLUMN, csv_files, parse_year};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FinalizeSummary {
    /// Raw tables written (merged with the parent's where present).
    pub tables: usize,
    /// Parent-only tables copied unchanged.
    pub carried: usize,
}

/// Rebuild `out_dir` from `raw_dir` and the parent's final result.
///
/// Idempotent for identical inputs; `parent_final` is only read.
#[instrument(skip_all, fields(step = step, raw = %raw_dir.display(), out = %out_dir.display()))]
pub fn finalize_result(
    raw_dir: &Path,
    parent_final: Option<&Path>,
    step: usize,
    years: &[u32],
    out_dir: &Path,
) -> Result<FinalizeSummary> {
    let raw_files = csv_files(raw_dir)?;
    if raw_files.is_empty() {
        bail!("raw output {} has no tables", raw_dir.display());
    }
    let parent_files = match parent_final {
        Some(dir) => csv_files(dir)?,
        None => Vec::new(),
    };

    reset_dir(out_dir)?;
    let mut summary = FinalizeSummary::default();
    let mut written: BTreeSet<OsString> = BTreeSet::new();

    for raw_path in &raw_files {
        let name = raw_path
            .file_name()
            .with_context(|| format!("file name of {}", raw_path.display()))?;
        let mut table = Table::read(raw_path)?;
        let has_years = table.retain_years(years)?;

        if has_years
            && let Some(parent_dir) = parent_final
            && parent_dir.join(name).is_file()
        {
            let parent_path = parent_dir.join(name);
            let parent = Table::read(&parent_path)?;
            if parent.headers != table.headers {
                bail!(
                    "header mismatch between {} {:?} and {} {:?}",
                    parent_path.display(),
                    parent.headers,
                    raw_path.display(),
                    table.headers
                );
            }
            table.rows = merge_rows(&parent, table.rows, years)?;
        }

        table.write(&out_dir.join(name))?;
        written.insert(name.to_os_string());
        summary.tables += 1;
    }

    for parent_path in &parent_files {
        let Some(name) = parent_path.file_name() else {
            continue;
        };
        if written.contains(name) {
            continue;
        }
        let target = out_dir.join(name);
        fs::copy(parent_path, &target)
            .with_context(|| format!("copy {} -> {}", parent_path.display(), target.display()))?;
        summary.carried += 1;
    }

    debug!(?summary, "result finalized");
    Ok(summary)
}

/// Parent rows outside `years`, followed by `rows`.
fn merge_rows(parent: &Table, rows: Vec<Vec<String>>, years: &[u32]) -> Result<Vec<Vec<String>>> {
    let idx = parent
        .column(YEAR_COLUMN)
        .with_context(|| format!("parent table has no {YEAR_COLUMN} column"))?;
    let mut merged = Vec::with_capacity(parent.rows.len() + rows.len());
    for row in &parent.rows {
        if !years.contains(&parse_year(&row[idx])?) {
            merged.push(row.clone());
        }
    }
    merged.extend(rows);
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_csv;

    #[test]
    fn step_zero_keeps_only_step_years() {
        let temp = tempfile::tempdir().expect("tempdir");
        let raw = temp.path().join("raw");
        write_csv(
            &raw.join("NewCapacity.csv"),
            "REGION,YEAR,VALUE\nR,1990,1\nR,1991,2\n",
        );
        write_csv(&raw.join("TotalDiscountedCost.csv"), "REGION,VALUE\nR,42\n");
        let out = temp.path().join("out");

        let summary = finalize_result(&raw, None, 0, &[1990], &out).expect("finalize");
        assert_eq!(summary, FinalizeSummary { tables: 2, carried: 0 });
        let table = Table::read(&out.join("NewCapacity.csv")).expect("read");
        assert_eq!(table.rows, vec![vec!["R", "1990", "1"]]);
        assert!(out.join("TotalDiscountedCost.csv").is_file());
    }

    #[test]
    fn parent_rows_are_prepended_and_parent_only_tables_carried() {
        let temp = tempfile::tempdir().expect("tempdir");
        let parent = temp.path().join("parent");
        write_csv(
            &parent.join("NewCapacity.csv"),
            "REGION,YEAR,VALUE\nR,1990,1\nR,1991,9\n",
        );
        write_csv(&parent.join("Trade.csv"), "REGION,YEAR,VALUE\nR,1990,3\n");
        let raw = temp.path().join("raw");
        write_csv(
            &raw.join("NewCapacity.csv"),
            "REGION,YEAR,VALUE\nR,1991,2\nR,1992,7\n",
        );
        let out = temp.path().join("out");
        let parent_before = fs::read_to_string(parent.join("NewCapacity.csv")).expect("read");

        let summary = finalize_result(&raw, Some(&parent), 1, &[1991], &out).expect("finalize");
        assert_eq!(summary, FinalizeSummary { tables: 1, carried: 1 });
        let table = Table::read(&out.join("NewCapacity.csv")).expect("read");
        assert_eq!(table.rows, vec![vec!["R", "1990", "1"], vec!["R", "1991", "2"]]);
        assert!(out.join("Trade.csv").is_file());
        assert_eq!(
            fs::read_to_string(parent.join("NewCapacity.csv")).expect("reread"),
            parent_before
        );
    }

    #[test]
    fn finalize_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let parent = temp.path().join("parent");
        write_csv(&parent.join("NewCapacity.csv"), "REGION,YEAR,VALUE\nR,1990,1\n");
        let raw = temp.path().join("raw");
        write_csv(&raw.join("NewCapacity.csv"), "REGION,YEAR,VALUE\nR,1991,2\n");
        let out = temp.path().join("out");

        finalize_result(&raw, Some(&parent), 1, &[1991], &out).expect("first");
        let first = fs::read_to_string(out.join("NewCapacity.csv")).expect("read");
        fs::write(out.join("leftover.csv"), "VALUE\n").expect("leftover");
        finalize_result(&raw, Some(&parent), 1, &[1991], &out).expect("second");
        let second = fs::read_to_string(out.join("NewCapacity.csv")).expect("read");
        assert_eq!(first, second);
        assert!(!out.join("leftover.csv").exists());
    }

    #[test]
    fn header_mismatch_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let parent = temp.path().join("parent");
        write_csv(&parent.join("NewCapacity.csv"), "REGION,YEAR,VALUE\nR,1990,1\n");
        let raw = temp.path().join("raw");
        write_csv(
            &raw.join("NewCapacity.csv"),
            "REGION,TECHNOLOGY,YEAR,VALUE\nR,E01,1991,2\n",
        );
        let err = finalize_result(&raw, Some(&parent), 1, &[1991], &temp.path().join("out"))
            .expect_err("mismatch");
        assert!(err.to_string().contains("header mismatch"));
    }
}
