//! Run configuration stored in `stepwise.toml`, merged with CLI flags.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::layout::Layout;
use crate::core::plan::StepLengthSpec;
use crate::errors::ConfigurationError;

pub const DEFAULT_CONFIG_FILE: &str = "stepwise.toml";
pub const DEFAULT_LOG_FILE: &str = "stepwise.log";

/// Stepwise configuration (TOML).
///
/// Missing fields default to the values in [`Default`]; a missing file is the
/// same as an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepwiseConfig {
    /// Per-step base data and node input datasets.
    pub data_root: PathBuf,
    /// Raw solver outputs and batch scratch files.
    pub work_root: PathBuf,
    /// Finalized results and `run_state.json`.
    pub results_root: PathBuf,
    /// Per-node solver logs.
    pub logs_root: PathBuf,

    /// Write a tracing log file in addition to stderr.
    pub file_logging: bool,
    /// Log file path; defaults to `<results_root>/stepwise.log`.
    pub log_file: Option<PathBuf>,

    /// Horizon years after a step's own years included in its solve window.
    pub lookahead_years: usize,
    /// Keep raw solver outputs after the next step has consumed them.
    pub keep_raw_results: bool,

    pub solve_timeout_secs: u64,
    pub batch_timeout_secs: u64,
    /// Truncate captured subprocess stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    pub run: RunDefaults,
    pub solver: SolverConfig,
    pub pipeline: PipelineConfig,
}

/// Defaults for values normally given on the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunDefaults {
    pub input_data: Option<PathBuf>,
    pub step_length: Vec<i64>,
    pub path_param: Option<PathBuf>,
    pub solver: Option<String>,
    pub cores: usize,
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            input_data: None,
            step_length: Vec::new(),
            path_param: None,
            solver: None,
            cores: 1,
        }
    }
}

/// Direct solve command used when no solver is named.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SolverConfig {
    /// Argv with `{input}` and `{output}` placeholders.
    pub command: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            command: ["just", "solve", "{input}", "{output}"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

/// External pipeline runner used when a solver is named.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Argv with `{snakefile}` and `{cores}` placeholders.
    pub command: Vec<String>,
    /// Replacement for the built-in Snakefile template.
    pub snakefile_template: Option<PathBuf>,
    /// Shell command per job; `{input}`, `{output}` and `{solver}` are substituted.
    pub solver_command: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            command: [
                "snakemake",
                "--snakefile",
                "{snakefile}",
                "--cores",
                "{cores}",
                "--keep-going",
            ]
            .map(str::to_string)
            .to_vec(),
            snakefile_template: None,
            solver_command: "just solve {input} {output} {solver}".to_string(),
        }
    }
}

impl Default for StepwiseConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("data"),
            work_root: PathBuf::from("steps"),
            results_root: PathBuf::from("results"),
            logs_root: PathBuf::from("results/solver_logs"),
            file_logging: true,
            log_file: None,
            lookahead_years: 0,
            keep_raw_results: false,
            solve_timeout_secs: 6 * 60 * 60,
            batch_timeout_secs: 24 * 60 * 60,
            output_limit_bytes: 100_000,
            run: RunDefaults::default(),
            solver: SolverConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl StepwiseConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid =
            |message: &str| -> Result<()> { Err(ConfigurationError::new(message).into()) };
        if self.solve_timeout_secs == 0 {
            return invalid("solve_timeout_secs must be > 0");
        }
        if self.batch_timeout_secs == 0 {
            return invalid("batch_timeout_secs must be > 0");
        }
        if self.output_limit_bytes == 0 {
            return invalid("output_limit_bytes must be > 0");
        }
        if self.run.cores == 0 {
            return invalid("run.cores must be > 0");
        }
        if !is_command(&self.solver.command) {
            return invalid("solver.command must be a non-empty array");
        }
        if !is_command(&self.pipeline.command) {
            return invalid("pipeline.command must be a non-empty array");
        }
        if self.pipeline.solver_command.trim().is_empty() {
            return invalid("pipeline.solver_command must not be empty");
        }
        let roots = [
            ("data_root", &self.data_root),
            ("work_root", &self.work_root),
            ("results_root", &self.results_root),
            ("logs_root", &self.logs_root),
        ];
        for (name, root) in roots {
            if root.as_os_str().is_empty() {
                return Err(ConfigurationError::new(format!("{name} must not be empty")).into());
            }
        }
        for (i, (name_a, a)) in roots.iter().enumerate() {
            for (name_b, b) in &roots[i + 1..] {
                if a == b {
                    return Err(ConfigurationError::new(format!(
                        "{name_a} and {name_b} must differ (both {})",
                        a.display()
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn layout(&self) -> Layout {
        Layout::new(
            &self.data_root,
            &self.work_root,
            &self.results_root,
            &self.logs_root,
        )
    }

    /// The tracing log file, if file logging is enabled.
    pub fn log_path(&self) -> Option<PathBuf> {
        if !self.file_logging {
            return None;
        }
        Some(
            self.log_file
                .clone()
                .unwrap_or_else(|| self.results_root.join(DEFAULT_LOG_FILE)),
        )
    }

    pub fn solve_timeout(&self) -> Duration {
        Duration::from_secs(self.solve_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

fn is_command(argv: &[String]) -> bool {
    argv.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StepwiseConfig::default()`.
pub fn load_config(path: &Path) -> Result<StepwiseConfig> {
    if !path.exists() {
        let cfg = StepwiseConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StepwiseConfig = toml::from_str(&contents)
        .map_err(|err| ConfigurationError::new(format!("parse {}: {err}", path.display())))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Command-line values that take precedence over `[run]` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOverrides {
    pub input_data: Option<PathBuf>,
    pub step_length: Vec<i64>,
    pub path_param: Option<PathBuf>,
    pub solver: Option<String>,
    pub cores: Option<usize>,
}

/// Fully resolved inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub input_data: PathBuf,
    pub step_length: StepLengthSpec,
    /// Scenario catalog directory; `None` runs without branching.
    pub catalog_dir: Option<PathBuf>,
    /// Named solver; selects the delegated strategy.
    pub solver: Option<String>,
    pub cores: usize,
    pub config: StepwiseConfig,
}

impl RunOptions {
    /// Merge CLI overrides over the config's `[run]` defaults.
    pub fn merge(config: StepwiseConfig, overrides: RunOverrides) -> Result<Self> {
        let input_data = overrides
            .input_data
            .or_else(|| config.run.input_data.clone())
            .ok_or_else(|| ConfigurationError::new("no input data given (--input-data)"))?;
        let lengths = if overrides.step_length.is_empty() {
            &config.run.step_length
        } else {
            &overrides.step_length
        };
        let step_length = StepLengthSpec::from_values(lengths)?;
        let cores = overrides.cores.unwrap_or(config.run.cores);
        if cores == 0 {
            return Err(ConfigurationError::new("--cores must be > 0").into());
        }
        let solver = overrides
            .solver
            .or_else(|| config.run.solver.clone())
            .filter(|name| !name.trim().is_empty());
        let catalog_dir = overrides.path_param.or_else(|| config.run.path_param.clone());
        Ok(Self {
            input_data,
            step_length,
            catalog_dir,
            solver,
            cores,
            config,
        })
    }
}
