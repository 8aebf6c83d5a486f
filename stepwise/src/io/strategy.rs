//! How a step's prepared nodes get solved.
//!
//! [`Delegated`] hands the whole step to a pipeline runner and is chosen when a
//! solver is named; [`Sequential`] solves node by node through a [`Solver`].
//! Either way the outcome is read back from the output directories only.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument};

use crate::io::config::RunOptions;
use crate::io::pipeline::{BatchDescriptor, BatchJob, PipelineRunner, SnakemakeRunner};
use crate::io::solver::{CommandSolver, SolveRequest, Solver};

/// One node handed to a strategy.
#[derive(Debug, Clone)]
pub struct SolveJob {
    /// Display form of the scenario path.
    pub path: String,
    pub request: SolveRequest,
}

pub trait SolveStrategy {
    fn name(&self) -> &'static str;

    /// Solve every job of `step`. Errors mean the solver or runner could not
    /// be run at all and abort the run.
    fn solve_step(&self, step: usize, jobs: &[SolveJob], batch_dir: &Path) -> Result<()>;
}

pub struct Sequential<S> {
    solver: S,
}

impl<S: Solver> Sequential<S> {
    pub fn new(solver: S) -> Self {
        Self { solver }
    }
}

impl<S: Solver> SolveStrategy for Sequential<S> {
    fn name(&self) -> &'static str {
        "sequential"
    }

    #[instrument(skip_all, fields(step = step, jobs = jobs.len()))]
    fn solve_step(&self, step: usize, jobs: &[SolveJob], _batch_dir: &Path) -> Result<()> {
        for (idx, job) in jobs.iter().enumerate() {
            debug!(path = %job.path, idx, "solving node");
            self.solver
                .solve(&job.request)
                .with_context(|| format!("solve step {step} scenario {}", job.path))?;
        }
        Ok(())
    }
}

pub struct Delegated<R> {
    runner: R,
    solver: String,
    cores: usize,
}

impl<R: PipelineRunner> Delegated<R> {
    pub fn new(runner: R, solver: impl Into<String>, cores: usize) -> Self {
        Self {
            runner,
            solver: solver.into(),
            cores,
        }
    }

    pub fn describe(&self, step: usize, jobs: &[SolveJob]) -> BatchDescriptor {
        BatchDescriptor {
            step,
            solver: self.solver.clone(),
            cores: self.cores,
            jobs: jobs
                .iter()
                .map(|job| BatchJob {
                    path: job.path.clone(),
                    input_dir: job.request.input_dir.clone(),
                    output_dir: job.request.output_dir.clone(),
                    log_path: job.request.log_path.clone(),
                })
                .collect(),
        }
    }
}

impl<R: PipelineRunner> SolveStrategy for Delegated<R> {
    fn name(&self) -> &'static str {
        "delegated"
    }

    #[instrument(skip_all, fields(step = step, jobs = jobs.len(), solver = %self.solver))]
    fn solve_step(&self, step: usize, jobs: &[SolveJob], batch_dir: &Path) -> Result<()> {
        if jobs.is_empty() {
            return Ok(());
        }
        let batch = self.describe(step, jobs);
        self.runner
            .run_batch(&batch, batch_dir)
            .with_context(|| format!("run pipeline for step {step}"))
    }
}

/// Build the strategy selected by `options`: delegated when a solver is named.
pub fn strategy_from_options(options: &RunOptions) -> Result<Box<dyn SolveStrategy>> {
    let config = &options.config;
    match &options.solver {
        Some(solver) => {
            let template = match &config.pipeline.snakefile_template {
                Some(path) => Some(
                    fs::read_to_string(path)
                        .with_context(|| format!("read Snakefile template {}", path.display()))?,
                ),
                None => None,
            };
            let runner = SnakemakeRunner::new(
                config.pipeline.command.clone(),
                config.pipeline.solver_command.clone(),
                template,
                config.batch_timeout(),
                config.output_limit_bytes,
            )?;
            info!(solver = %solver, cores = options.cores, "using delegated solve strategy");
            Ok(Box::new(Delegated::new(runner, solver.clone(), options.cores)))
        }
        None => {
            let solver = CommandSolver::new(
                config.solver.command.clone(),
                config.solve_timeout(),
                config.output_limit_bytes,
            )?;
            info!(command = ?config.solver.command, "using sequential solve strategy");
            Ok(Box::new(Sequential::new(solver)))
        }
    }
}
