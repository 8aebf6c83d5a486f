//! Scenario catalog: per-step decisions and the overrides behind each option.
//!
//! Layout: `<catalog>/<step>/<DECISION>/<PARAMETER>.csv`, where `<step>` is a
//! step index (`1` or `step1`) and `<DECISION>` a letters-only name. Each CSV
//! has an `OPTION` column, the parameter's index columns and `VALUE`. Decision
//! `A` option `0` is labelled `A0`; a step's labels are the Cartesian product
//! of its decisions, concatenated in decision-name order (`A0B1`).

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, instrument};

use crate::core::scenario_path::{OptionLabel, ScenarioPath};
use crate::errors::CatalogError;
use crate::io::table::{Table, VALUE_COLUMN, YEAR_COLUMN, csv_files, parse_year};

pub const OPTION_COLUMN: &str = "OPTION";

static STEP_DIR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:step)?(\d+)$").unwrap());
static DECISION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").unwrap());

/// One overridden cell: the row of `parameter` keyed by `index` gets `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterOverride {
    pub parameter: String,
    pub index: Vec<(String, String)>,
    pub value: String,
}

impl ParameterOverride {
    pub fn year(&self) -> Option<&str> {
        self.index
            .iter()
            .find(|(col, _)| col == YEAR_COLUMN)
            .map(|(_, cell)| cell.as_str())
    }
}

/// Option labels valid at one step and the overrides behind each.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOptions {
    labels: Vec<OptionLabel>,
    overrides: BTreeMap<OptionLabel, Vec<ParameterOverride>>,
}

impl StepOptions {
    /// "No branching": a single trivial label with no overrides.
    fn trivial() -> Self {
        Self {
            labels: vec![OptionLabel::trivial()],
            overrides: BTreeMap::new(),
        }
    }

    pub fn labels(&self) -> &[OptionLabel] {
        &self.labels
    }
}

/// A catalog file and the index columns its rows use.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CatalogFile {
    path: PathBuf,
    parameter: String,
    index_columns: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioCatalog {
    steps: Vec<StepOptions>,
    files: Vec<CatalogFile>,
}

impl ScenarioCatalog {
    /// A catalog with no branching at any of `num_steps` steps.
    pub fn empty(num_steps: usize) -> Self {
        Self {
            steps: (0..num_steps).map(|_| StepOptions::trivial()).collect(),
            files: Vec::new(),
        }
    }

    /// Load the catalog under `dir`; steps without decisions become trivial.
    #[instrument(skip_all, fields(dir = %dir.display(), num_steps = num_steps))]
    pub fn load(dir: &Path, num_steps: usize) -> Result<Self> {
        if !dir.is_dir() {
            return Err(CatalogError::new(dir, "catalog directory does not exist").into());
        }
        let mut catalog = Self::empty(num_steps);

        for (step, step_dir) in step_dirs(dir)? {
            if step >= num_steps {
                return Err(CatalogError::new(
                    &step_dir,
                    format!("step {step} is beyond the planned {num_steps} steps"),
                )
                .into());
            }
            let mut decisions = Vec::new();
            for (name, decision_dir) in decision_dirs(&step_dir)? {
                let (options, files) = load_decision(&name, &decision_dir)?;
                catalog.files.extend(files);
                decisions.push((name, options));
            }
            if decisions.is_empty() {
                debug!(step, "catalog step has no decisions");
                continue;
            }
            let options = combine_decisions(&decisions);
            info!(
                step,
                labels = ?options.labels.iter().map(OptionLabel::as_str).collect::<Vec<_>>(),
                "loaded step options"
            );
            catalog.steps[step] = options;
        }

        Ok(catalog)
    }

    pub fn num_steps(&self) -> usize {
        self.steps.len()
    }

    /// Labels valid at `step`; at least one (possibly trivial).
    pub fn labels(&self, step: usize) -> &[OptionLabel] {
        self.steps
            .get(step)
            .map(StepOptions::labels)
            .unwrap_or_default()
    }

    pub fn overrides(&self, step: usize, label: &OptionLabel) -> &[ParameterOverride] {
        self.steps
            .get(step)
            .and_then(|options| options.overrides.get(label))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Overrides of every non-trivial label on `path`, oldest step first.
    pub fn path_overrides(&self, path: &ScenarioPath) -> Vec<&ParameterOverride> {
        path.labelled_steps()
            .flat_map(|(step, label)| self.overrides(step, label))
            .collect()
    }

    /// Check that every overridden parameter exists in `data_dir` with the same
    /// index columns the catalog uses.
    pub fn validate_against(&self, data_dir: &Path) -> Result<()> {
        for file in &self.files {
            let target = data_dir.join(format!("{}.csv", file.parameter));
            if !target.is_file() {
                return Err(CatalogError::new(
                    &file.path,
                    format!("parameter file {} is missing", target.display()),
                )
                .into());
            }
            let table = Table::read(&target)?;
            let columns: BTreeSet<String> =
                table.index_columns().into_iter().map(str::to_string).collect();
            if columns != file.index_columns {
                return Err(CatalogError::new(
                    &file.path,
                    format!(
                        "index columns {:?} do not match {} columns {:?}",
                        file.index_columns,
                        target.display(),
                        columns
                    ),
                )
                .into());
            }
        }
        Ok(())
    }
}

fn step_dirs(dir: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let mut steps = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(caps) = STEP_DIR_RE.captures(&name) else {
            debug!(name, "skipping non-step catalog entry");
            continue;
        };
        let step: usize = caps[1]
            .parse()
            .map_err(|_| CatalogError::new(&path, "step index out of range"))?;
        steps.push((step, path));
    }
    steps.sort();
    for pair in steps.windows(2) {
        if pair[0].0 == pair[1].0 {
            return Err(CatalogError::new(&pair[1].1, "duplicate step directory").into());
        }
    }
    Ok(steps)
}

fn decision_dirs(step_dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut decisions = Vec::new();
    for entry in fs::read_dir(step_dir).with_context(|| format!("read {}", step_dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", step_dir.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !DECISION_RE.is_match(&name) {
            return Err(
                CatalogError::new(&path, "decision names must be letters only (e.g. 'A')").into(),
            );
        }
        decisions.push((name, path));
    }
    decisions.sort();
    Ok(decisions)
}

type DecisionOptions = BTreeMap<u32, Vec<ParameterOverride>>;

fn load_decision(name: &str, dir: &Path) -> Result<(DecisionOptions, Vec<CatalogFile>)> {
    let mut options: DecisionOptions = BTreeMap::new();
    let mut files = Vec::new();
    for path in csv_files(dir)? {
        let parameter = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = load_parameter_file(&path, &parameter, &mut options)?;
        files.push(file);
    }
    if options.is_empty() {
        return Err(CatalogError::new(dir, format!("decision {name} defines no options")).into());
    }
    Ok((options, files))
}

fn load_parameter_file(
    path: &Path,
    parameter: &str,
    options: &mut DecisionOptions,
) -> Result<CatalogFile> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|err| CatalogError::new(path, err.to_string()))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| CatalogError::new(path, err.to_string()))?
        .iter()
        .map(str::to_string)
        .collect();
    let option_idx = headers
        .iter()
        .position(|h| h == OPTION_COLUMN)
        .ok_or_else(|| CatalogError::new(path, format!("missing {OPTION_COLUMN} column")))?;
    let value_idx = headers
        .iter()
        .position(|h| h == VALUE_COLUMN)
        .ok_or_else(|| CatalogError::new(path, format!("missing {VALUE_COLUMN} column")))?;
    let year_idx = headers.iter().position(|h| h == YEAR_COLUMN);
    let index_columns: Vec<(usize, &String)> = headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != option_idx && *idx != value_idx)
        .collect();

    for record in reader.records() {
        let record = record.map_err(|err| CatalogError::new(path, err.to_string()))?;
        let line = record.position().map(|pos| pos.line()).unwrap_or_default();
        let option: u32 = record[option_idx].parse().map_err(|_| {
            CatalogError::new(
                path,
                format!("line {line}: OPTION '{}' is not an unsigned integer", &record[option_idx]),
            )
        })?;
        let value = &record[value_idx];
        if value.parse::<f64>().is_err() {
            return Err(CatalogError::new(
                path,
                format!("line {line}: VALUE '{value}' is not numeric"),
            )
            .into());
        }
        if let Some(idx) = year_idx
            && parse_year(&record[idx]).is_err()
        {
            return Err(CatalogError::new(
                path,
                format!("line {line}: {YEAR_COLUMN} '{}' is not a year", &record[idx]),
            )
            .into());
        }
        let index = index_columns
            .iter()
            .map(|(idx, col)| ((*col).clone(), record[*idx].to_string()))
            .collect();
        options.entry(option).or_default().push(ParameterOverride {
            parameter: parameter.to_string(),
            index,
            value: value.to_string(),
        });
    }

    Ok(CatalogFile {
        path: path.to_path_buf(),
        parameter: parameter.to_string(),
        index_columns: index_columns.into_iter().map(|(_, col)| col.clone()).collect(),
    })
}

/// Cartesian product of decisions, in decision-name then option order.
fn combine_decisions(decisions: &[(String, DecisionOptions)]) -> StepOptions {
    let mut combos: Vec<(String, Vec<ParameterOverride>)> = vec![(String::new(), Vec::new())];
    for (name, options) in decisions {
        let mut next = Vec::with_capacity(combos.len() * options.len());
        for (prefix, overrides) in &combos {
            for (option, rows) in options {
                let mut merged = overrides.clone();
                merged.extend(rows.iter().cloned());
                next.push((format!("{prefix}{name}{option}"), merged));
            }
        }
        combos = next;
    }

    let mut labels = Vec::with_capacity(combos.len());
    let mut overrides = BTreeMap::new();
    for (label, rows) in combos {
        let label = OptionLabel::new(label);
        labels.push(label.clone());
        overrides.insert(label, rows);
    }
    StepOptions { labels, overrides }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_csv;

    fn labels(catalog: &ScenarioCatalog, step: usize) -> Vec<String> {
        catalog
            .labels(step)
            .iter()
            .map(|l| l.as_str().to_string())
            .collect()
    }

    #[test]
    fn steps_without_decisions_are_trivial() {
        let temp = tempfile::tempdir().expect("tempdir");
        let catalog_dir = temp.path().join("scenarios");
        write_csv(
            &catalog_dir.join("1/A/CapitalCost.csv"),
            "OPTION,REGION,TECHNOLOGY,YEAR,VALUE\n0,R,E01,1991,100\n1,R,E01,1991,200\n",
        );

        let catalog = ScenarioCatalog::load(&catalog_dir, 3).expect("load");
        assert_eq!(labels(&catalog, 0), vec![""]);
        assert_eq!(labels(&catalog, 1), vec!["A0", "A1"]);
        assert_eq!(labels(&catalog, 2), vec![""]);
        assert!(catalog.labels(0)[0].is_trivial());
    }

    #[test]
    fn decisions_in_one_step_combine_by_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        write_csv(
            &dir.join("step0/B/Demand.csv"),
            "OPTION,REGION,YEAR,VALUE\n0,R,1990,1\n1,R,1990,2\n",
        );
        write_csv(
            &dir.join("step0/A/CapitalCost.csv"),
            "OPTION,REGION,YEAR,VALUE\n0,R,1990,10\n1,R,1990,20\n",
        );

        let catalog = ScenarioCatalog::load(dir, 1).expect("load");
        assert_eq!(labels(&catalog, 0), vec!["A0B0", "A0B1", "A1B0", "A1B1"]);

        let overrides = catalog.overrides(0, &OptionLabel::new("A1B0"));
        let values: Vec<(&str, &str)> = overrides
            .iter()
            .map(|o| (o.parameter.as_str(), o.value.as_str()))
            .collect();
        assert_eq!(values, vec![("CapitalCost", "20"), ("Demand", "1")]);
        assert_eq!(overrides[0].year(), Some("1990"));
    }

    #[test]
    fn path_overrides_follow_every_labelled_step() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        write_csv(&dir.join("0/A/P.csv"), "OPTION,YEAR,VALUE\n0,1990,1\n");
        write_csv(&dir.join("2/B/Q.csv"), "OPTION,YEAR,VALUE\n0,1992,2\n");
        let catalog = ScenarioCatalog::load(dir, 3).expect("load");

        let path = ScenarioPath::from_labels(vec![
            OptionLabel::new("A0"),
            OptionLabel::trivial(),
            OptionLabel::new("B0"),
        ]);
        let params: Vec<&str> = catalog
            .path_overrides(&path)
            .iter()
            .map(|o| o.parameter.as_str())
            .collect();
        assert_eq!(params, vec!["P", "Q"]);
    }

    #[test]
    fn malformed_rows_fail_at_load() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = temp.path();
        write_csv(&dir.join("0/A/P.csv"), "OPTION,YEAR,VALUE\nx,1990,1\n");
        let err = ScenarioCatalog::load(dir, 1).expect_err("bad option");
        let catalog_err = err.downcast_ref::<CatalogError>().expect("catalog error");
        assert!(catalog_err.message.contains("OPTION 'x'"));

        write_csv(&dir.join("0/A/P.csv"), "OPTION,YEAR,VALUE\n0,1990,lots\n");
        let err = ScenarioCatalog::load(dir, 1).expect_err("bad value");
        assert!(err.to_string().contains("not numeric"));

        write_csv(&dir.join("0/A/P.csv"), "OPTION,YEAR,VALUE\n0,1990,1\n1,ninety,1\n");
        let err = ScenarioCatalog::load(dir, 1).expect_err("bad year");
        let catalog_err = err.downcast_ref::<CatalogError>().expect("catalog error");
        assert!(catalog_err.message.contains("line 3: YEAR 'ninety'"));

        write_csv(&dir.join("0/A/P.csv"), "OPTION,YEAR,VALUE\n0,1990\n");
        let err = ScenarioCatalog::load(dir, 1).expect_err("ragged row");
        assert!(err.downcast_ref::<CatalogError>().is_some());
    }

    #[test]
    fn missing_directory_and_out_of_plan_steps_are_errors() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = ScenarioCatalog::load(&temp.path().join("nope"), 2).expect_err("missing");
        assert!(err.downcast_ref::<CatalogError>().is_some());

        write_csv(&temp.path().join("5/A/P.csv"), "OPTION,VALUE\n0,1\n");
        let err = ScenarioCatalog::load(temp.path(), 2).expect_err("beyond plan");
        assert!(err.to_string().contains("beyond the planned 2 steps"));
    }

    #[test]
    fn validate_against_requires_parameter_files_with_matching_columns() {
        let temp = tempfile::tempdir().expect("tempdir");
        let catalog_dir = temp.path().join("scenarios");
        let data_dir = temp.path().join("data");
        write_csv(
            &catalog_dir.join("0/A/CapitalCost.csv"),
            "OPTION,REGION,YEAR,VALUE\n0,R,1990,1\n",
        );
        let catalog = ScenarioCatalog::load(&catalog_dir, 1).expect("load");

        fs::create_dir_all(&data_dir).expect("mkdir");
        let err = catalog.validate_against(&data_dir).expect_err("missing file");
        assert!(err.to_string().contains("is missing"));

        write_csv(
            &data_dir.join("CapitalCost.csv"),
            "REGION,TECHNOLOGY,YEAR,VALUE\nR,E01,1990,5\n",
        );
        let err = catalog.validate_against(&data_dir).expect_err("columns differ");
        assert!(err.to_string().contains("do not match"));

        write_csv(&data_dir.join("CapitalCost.csv"), "REGION,YEAR,VALUE\nR,1990,5\n");
        catalog.validate_against(&data_dir).expect("valid");
    }
}
