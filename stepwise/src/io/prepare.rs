//! Node input preparation: seed from the step base, carry the parent's results
//! over, then apply the path's option overrides.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::io::catalog::ParameterOverride;
use crate::io::dirs::{copy_files, reset_dir};
use crate::io::table::{Table, parse_year};

/// Subdirectory of a node's input holding the parent's finalized results.
pub const CARRY_OVER_DIR: &str = "carry_over";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PrepareSummary {
    pub seeded_files: usize,
    pub carried_files: usize,
    pub applied_overrides: usize,
    pub skipped_overrides: usize,
}

/// Build a node's working input directory from scratch.
///
/// `parent_final` is `None` at step 0. Overrides whose `YEAR` lies outside
/// `window` are skipped.
#[instrument(skip_all, fields(input = %input_dir.display()))]
pub fn prepare_node_input(
    base_dir: &Path,
    parent_final: Option<&Path>,
    input_dir: &Path,
    overrides: &[&ParameterOverride],
    window: &[u32],
) -> Result<PrepareSummary> {
    reset_dir(input_dir)?;
    let mut summary = PrepareSummary {
        seeded_files: copy_files(base_dir, input_dir).context("seed node input")?,
        ..PrepareSummary::default()
    };
    if let Some(parent_final) = parent_final {
        summary.carried_files = copy_files(parent_final, &input_dir.join(CARRY_OVER_DIR))
            .context("carry over parent results")?;
    }

    let (applied, skipped) = apply_overrides(input_dir, overrides, window)?;
    summary.applied_overrides = applied;
    summary.skipped_overrides = skipped;
    debug!(?summary, "node input prepared");
    Ok(summary)
}

/// Upsert every override into its parameter table under `data_dir`.
///
/// Returns `(applied, skipped)` counts.
pub fn apply_overrides(
    data_dir: &Path,
    overrides: &[&ParameterOverride],
    window: &[u32],
) -> Result<(usize, usize)> {
    let mut by_parameter: BTreeMap<&str, Vec<&ParameterOverride>> = BTreeMap::new();
    for row in overrides {
        by_parameter.entry(row.parameter.as_str()).or_default().push(row);
    }

    let (mut applied, mut skipped) = (0, 0);
    for (parameter, rows) in by_parameter {
        let path = data_dir.join(format!("{parameter}.csv"));
        let mut table = Table::read(&path)?;
        for row in rows {
            if let Some(year) = row.year()
                && !window.contains(&parse_year(year)?)
            {
                skipped += 1;
                continue;
            }
            table
                .upsert(&row.index, &row.value)
                .with_context(|| format!("apply override to {}", path.display()))?;
            applied += 1;
        }
        table.write(&path)?;
    }
    Ok((applied, skipped))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_support::write_csv;

    fn override_row(year: &str, value: &str) -> ParameterOverride {
        ParameterOverride {
            parameter: "CapitalCost".to_string(),
            index: vec![
                ("REGION".to_string(), "R".to_string()),
                ("YEAR".to_string(), year.to_string()),
            ],
            value: value.to_string(),
        }
    }

    #[test]
    fn prepare_seeds_carries_over_and_overrides() {
        let temp = tempfile::tempdir().expect("tempdir");
        let base = temp.path().join("base");
        write_csv(
            &base.join("CapitalCost.csv"),
            "REGION,YEAR,VALUE\nR,1991,100\nR,1992,100\n",
        );
        let parent = temp.path().join("parent");
        write_csv(&parent.join("NewCapacity.csv"), "REGION,YEAR,VALUE\nR,1990,5\n");
        let input = temp.path().join("node/data");
        fs::create_dir_all(&input).expect("mkdir");
        fs::write(input.join("stale.csv"), "VALUE\n").expect("stale");

        let rows = [override_row("1992", "250"), override_row("1993", "999")];
        let refs: Vec<&ParameterOverride> = rows.iter().collect();
        let summary =
            prepare_node_input(&base, Some(&parent), &input, &refs, &[1991, 1992]).expect("prepare");

        assert_eq!(
            summary,
            PrepareSummary {
                seeded_files: 1,
                carried_files: 1,
                applied_overrides: 1,
                skipped_overrides: 1,
            }
        );
        assert!(!input.join("stale.csv").exists());
        assert!(input.join(CARRY_OVER_DIR).join("NewCapacity.csv").is_file());
        let table = Table::read(&input.join("CapitalCost.csv")).expect("read");
        assert_eq!(table.rows, vec![vec!["R", "1991", "100"], vec!["R", "1992", "250"]]);
        // Base data is never touched.
        let base_table = Table::read(&base.join("CapitalCost.csv")).expect("read base");
        assert_eq!(base_table.rows[1][2], "100");
    }

    #[test]
    fn override_for_missing_parameter_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let rows = [override_row("1991", "1")];
        let refs: Vec<&ParameterOverride> = rows.iter().collect();
        assert!(apply_overrides(temp.path(), &refs, &[1991]).is_err());
    }
}
