//! Delegated batch solving through an external pipeline runner.
//!
//! The executor hands a whole step to a [`PipelineRunner`] as a
//! [`BatchDescriptor`]. The runner reports nothing back except through the
//! presence or absence of each job's output artifacts.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use minijinja::{Environment, context};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::io::dirs::ensure_dir;
use crate::io::process::run_command_with_timeout;
use crate::io::run_store::write_atomic;

const SNAKEFILE_TEMPLATE: &str = include_str!("templates/Snakefile.j2");

pub const BATCH_FILE: &str = "batch.json";
pub const SNAKEFILE: &str = "Snakefile";
pub const PIPELINE_LOG: &str = "pipeline.log";

/// One node's solve inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchJob {
    /// Scenario path label, for humans reading the descriptor.
    pub path: String,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub log_path: PathBuf,
}

/// Everything the pipeline runner needs to solve one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchDescriptor {
    pub step: usize,
    pub solver: String,
    pub cores: usize,
    pub jobs: Vec<BatchJob>,
}

impl BatchDescriptor {
    /// Write `batch.json` into `batch_dir`.
    pub fn write(&self, batch_dir: &Path) -> Result<PathBuf> {
        let path = batch_dir.join(BATCH_FILE);
        let mut buf = serde_json::to_string_pretty(self).context("serialize batch descriptor")?;
        buf.push('\n');
        write_atomic(&path, &buf)?;
        Ok(path)
    }
}

/// Abstraction over external pipeline runners.
pub trait PipelineRunner {
    /// Run every job of `batch`, using `batch_dir` for scratch files. Errors are
    /// reserved for failures to run the pipeline at all.
    fn run_batch(&self, batch: &BatchDescriptor, batch_dir: &Path) -> Result<()>;
}

/// Runner that renders a Snakefile and invokes `snakemake`.
#[derive(Debug)]
pub struct SnakemakeRunner {
    env: Environment<'static>,
    template: String,
    command: Vec<String>,
    solver_command: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl SnakemakeRunner {
    /// `template` overrides the built-in Snakefile template.
    pub fn new(
        command: Vec<String>,
        solver_command: String,
        template: Option<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("pipeline command must be a non-empty array");
        }
        if solver_command.trim().is_empty() {
            bail!("pipeline solver_command must not be empty");
        }
        let env = Environment::new();
        let template = template.unwrap_or_else(|| SNAKEFILE_TEMPLATE.to_string());
        env.template_from_str(&template)
            .context("parse Snakefile template")?;
        Ok(Self {
            env,
            template,
            command,
            solver_command,
            timeout,
            output_limit_bytes,
        })
    }

    /// Render the Snakefile for `batch`.
    pub fn render(&self, batch: &BatchDescriptor) -> Result<String> {
        let shell = self
            .solver_command
            .replace("{solver}", &batch.solver);
        let jobs: Vec<_> = batch
            .jobs
            .iter()
            .map(|job| -> Result<minijinja::Value> {
                Ok(context! {
                    path => job.path,
                    input_dir => quoted(&job.input_dir)?,
                    output_dir => quoted(&job.output_dir)?,
                    log_path => quoted(&job.log_path)?,
                })
            })
            .collect::<Result<_>>()?;
        let rendered = self.env.render_str(&self.template, context! {
            step => batch.step,
            solver => batch.solver,
            jobs => jobs,
            shell => serde_json::to_string(&format!("{shell} > {{log}} 2>&1"))?,
        })
        .context("render Snakefile")?;
        Ok(rendered)
    }

    fn build(&self, snakefile: &Path, cores: usize) -> Command {
        let snakefile = snakefile.display().to_string();
        let cores = cores.to_string();
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| arg.replace("{snakefile}", &snakefile).replace("{cores}", &cores))
            .collect();
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);
        cmd
    }
}

impl PipelineRunner for SnakemakeRunner {
    #[instrument(skip_all, fields(step = batch.step, jobs = batch.jobs.len(), cores = batch.cores))]
    fn run_batch(&self, batch: &BatchDescriptor, batch_dir: &Path) -> Result<()> {
        ensure_dir(batch_dir)?;
        batch.write(batch_dir)?;
        let snakefile = batch_dir.join(SNAKEFILE);
        fs::write(&snakefile, self.render(batch)?)
            .with_context(|| format!("write {}", snakefile.display()))?;
        info!(snakefile = %snakefile.display(), "starting pipeline runner");

        let output = run_command_with_timeout(
            self.build(&snakefile, batch.cores),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run pipeline")?;
        let log = batch_dir.join(PIPELINE_LOG);
        output.write_log(&log, "pipeline")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "pipeline timed out");
        } else if !output.success() {
            warn!(exit_code = ?output.status.code(), log = %log.display(), "pipeline reported failures");
        } else {
            debug!("pipeline finished");
        }
        Ok(())
    }
}

/// A path as a double-quoted string literal the Snakefile can embed.
fn quoted(path: &Path) -> Result<String> {
    serde_json::to_string(&path.display().to_string()).context("quote path")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> BatchDescriptor {
        BatchDescriptor {
            step: 1,
            solver: "gurobi".to_string(),
            cores: 4,
            jobs: vec![
                BatchJob {
                    path: "A0B0".to_string(),
                    input_dir: PathBuf::from("data/step1/A0/B0/data"),
                    output_dir: PathBuf::from("steps/step1/A0/B0"),
                    log_path: PathBuf::from("logs/step1/A0/B0/solve.log"),
                },
                BatchJob {
                    path: "A0B1".to_string(),
                    input_dir: PathBuf::from("data/step1/A0/B1/data"),
                    output_dir: PathBuf::from("steps/step1/A0/B1"),
                    log_path: PathBuf::from("logs/step1/A0/B1/solve.log"),
                },
            ],
        }
    }

    fn runner(command: &[&str]) -> SnakemakeRunner {
        SnakemakeRunner::new(
            command.iter().map(|s| s.to_string()).collect(),
            "just solve {input} {output} {solver}".to_string(),
            None,
            Duration::from_secs(5),
            10_000,
        )
        .expect("runner")
    }

    #[test]
    fn render_lists_one_rule_per_job() {
        let rendered = runner(&["snakemake"]).render(&batch()).expect("render");
        assert!(rendered.contains("rule solve_0:"));
        assert!(rendered.contains("rule solve_1:"));
        assert!(rendered.contains("directory(\"steps/step1/A0/B1\")"));
        assert!(rendered.contains("\"just solve {input} {output} gurobi > {log} 2>&1\""));
        assert!(rendered.contains("# scenario A0B0"));
    }

    #[test]
    fn custom_template_replaces_builtin() {
        let runner = SnakemakeRunner::new(
            vec!["snakemake".to_string()],
            "solve".to_string(),
            Some("step={{ step }} jobs={{ jobs | length }}".to_string()),
            Duration::from_secs(5),
            100,
        )
        .expect("runner");
        assert_eq!(runner.render(&batch()).expect("render"), "step=1 jobs=2");
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        assert!(
            SnakemakeRunner::new(Vec::new(), "solve".to_string(), None, Duration::from_secs(1), 1)
                .is_err()
        );
        assert!(
            SnakemakeRunner::new(
                vec!["snakemake".to_string()],
                "solve".to_string(),
                Some("{% if %}".to_string()),
                Duration::from_secs(1),
                1
            )
            .is_err()
        );
    }

    #[cfg(unix)]
    #[test]
    fn run_batch_writes_descriptor_snakefile_and_log() {
        let temp = tempfile::tempdir().expect("tempdir");
        let batch_dir = temp.path().join("batches/step1");
        runner(&["sh", "-c", "echo cores={cores}", "--", "{snakefile}"])
            .run_batch(&batch(), &batch_dir)
            .expect("run batch");

        let descriptor: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(batch_dir.join(BATCH_FILE)).expect("read batch"),
        )
        .expect("parse batch");
        assert_eq!(descriptor["solver"], "gurobi");
        assert_eq!(descriptor["jobs"][1]["path"], "A0B1");
        assert!(batch_dir.join(SNAKEFILE).is_file());
        let log = fs::read_to_string(batch_dir.join(PIPELINE_LOG)).expect("log");
        assert!(log.contains("cores=4"));
    }
}
