//! Test-only helpers: model-data fixtures and scripted solve backends.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Result, bail};

use crate::io::pipeline::{BatchDescriptor, PipelineRunner};
use crate::io::solver::{SolveRequest, Solver};
use crate::io::table::{Table, YEAR_COLUMN};

/// Write `contents` to `path`, creating parent directories.
pub fn write_csv(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture dir");
    }
    fs::write(path, contents).expect("write fixture");
}

/// A tiny otoole-style dataset: `YEAR`, `REGION`, `TECHNOLOGY`, a
/// year-indexed `CapitalCost` (100 per year for `E01`) and a year-less
/// `DiscountRate`.
pub fn write_model_data(dir: &Path, years: RangeInclusive<u32>) {
    let mut year_set = String::from("VALUE\n");
    let mut capital = String::from("REGION,TECHNOLOGY,YEAR,VALUE\n");
    for year in years {
        year_set.push_str(&format!("{year}\n"));
        capital.push_str(&format!("R,E01,{year},100\n"));
    }
    write_csv(&dir.join("YEAR.csv"), &year_set);
    write_csv(&dir.join("REGION.csv"), "VALUE\nR\n");
    write_csv(&dir.join("TECHNOLOGY.csv"), "VALUE\nE01\n");
    write_csv(&dir.join("CapitalCost.csv"), &capital);
    write_csv(&dir.join("DiscountRate.csv"), "REGION,VALUE\nR,0.05\n");
}

/// Scripted [`Solver`] that writes a result table derived from its input.
///
/// For every year in the input's `YEAR.csv` it writes a `NewCapacity.csv`
/// row whose value is the input `CapitalCost` of `E01` that year, so tests
/// can see which overrides reached the solve. Outputs ending in a path
/// registered with [`ScriptedSolver::fail_at`] are left empty. Clones share
/// their call log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSolver {
    failing: Rc<RefCell<BTreeSet<PathBuf>>>,
    broken: bool,
    calls: Rc<RefCell<Vec<PathBuf>>>,
}

impl ScriptedSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A solver that cannot be started at all.
    pub fn broken() -> Self {
        Self {
            broken: true,
            ..Self::default()
        }
    }

    /// Leave output empty for the node at `step` whose directory segments are
    /// `segments` (e.g. `"A0"` or `"A0/B1"`).
    pub fn fail_at(self, step: usize, segments: &str) -> Self {
        let mut suffix = PathBuf::from(format!("step{step}"));
        for seg in segments.split('/').filter(|s| !s.is_empty()) {
            suffix.push(seg);
        }
        self.failing.borrow_mut().insert(suffix);
        self
    }

    /// Input directories solved so far, in call order.
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.borrow().clone()
    }

    fn fails(&self, output_dir: &Path) -> bool {
        self.failing
            .borrow()
            .iter()
            .any(|suffix| output_dir.ends_with(suffix))
    }

    /// Solve `input_dir` into `output_dir` (which may not exist yet).
    pub fn solve_dirs(&self, input_dir: &Path, output_dir: &Path) -> Result<()> {
        if self.broken {
            bail!("scripted solver is broken");
        }
        self.calls.borrow_mut().push(input_dir.to_path_buf());
        fs::create_dir_all(output_dir)?;
        if self.fails(output_dir) {
            return Ok(());
        }

        let years = Table::read(&input_dir.join("YEAR.csv"))?;
        let capital = Table::read(&input_dir.join("CapitalCost.csv"))?;
        let year_idx = capital.column(YEAR_COLUMN).unwrap_or(2);
        let mut out = Table {
            headers: ["REGION", "YEAR", "VALUE"].map(str::to_string).to_vec(),
            rows: Vec::new(),
        };
        for row in &years.rows {
            let year = &row[0];
            let cost = capital
                .rows
                .iter()
                .find(|r| r[1] == "E01" && &r[year_idx] == year)
                .map(|r| r[3].clone())
                .unwrap_or_else(|| "0".to_string());
            out.rows.push(vec!["R".to_string(), year.clone(), cost]);
        }
        out.write(&output_dir.join("NewCapacity.csv"))?;
        Ok(())
    }
}

impl Solver for ScriptedSolver {
    fn solve(&self, request: &SolveRequest) -> Result<()> {
        self.solve_dirs(&request.input_dir, &request.output_dir)
    }
}

/// Scripted [`PipelineRunner`] that records batches and solves each job with
/// an inner [`ScriptedSolver`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedPipelineRunner {
    solver: ScriptedSolver,
    batches: Rc<RefCell<Vec<BatchDescriptor>>>,
}

impl ScriptedPipelineRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver(solver: ScriptedSolver) -> Self {
        Self {
            solver,
            ..Self::default()
        }
    }

    pub fn batches(&self) -> Vec<BatchDescriptor> {
        self.batches.borrow().clone()
    }
}

impl PipelineRunner for ScriptedPipelineRunner {
    fn run_batch(&self, batch: &BatchDescriptor, batch_dir: &Path) -> Result<()> {
        self.batches.borrow_mut().push(batch.clone());
        if !batch.jobs.is_empty() {
            batch.write(batch_dir)?;
        }
        for job in &batch.jobs {
            self.solver.solve_dirs(&job.input_dir, &job.output_dir)?;
        }
        Ok(())
    }
}
