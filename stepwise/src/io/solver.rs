//! Direct (per-node) solve abstraction.
//!
//! The [`Solver`] trait decouples step orchestration from the actual model
//! toolchain. A solve leaves artifacts in `output_dir` or leaves it empty; the
//! executor decides success by output presence alone. Tests use scripted
//! solvers that write (or withhold) outputs without spawning processes.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::dirs::ensure_dir;
use crate::io::process::run_command_with_timeout;

pub const INPUT_PLACEHOLDER: &str = "{input}";
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// Parameters for one node's solve.
#[derive(Debug, Clone)]
pub struct SolveRequest {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where to write the solver's stdout/stderr transcript.
    pub log_path: PathBuf,
}

/// Abstraction over direct solve backends.
pub trait Solver {
    /// Solve one node. Errors are reserved for failures to run the solver at
    /// all; a solve that produced nothing returns `Ok`.
    fn solve(&self, request: &SolveRequest) -> Result<()>;
}

/// Solver that runs a configured argv with `{input}`/`{output}` substituted.
#[derive(Debug, Clone)]
pub struct CommandSolver {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandSolver {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Result<Self> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            bail!("solver command must be a non-empty array");
        }
        Ok(Self {
            command,
            timeout,
            output_limit_bytes,
        })
    }

    fn build(&self, request: &SolveRequest) -> Command {
        let input = request.input_dir.display().to_string();
        let output = request.output_dir.display().to_string();
        let args: Vec<String> = self
            .command
            .iter()
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect();
        let mut cmd = Command::new(&args[0]);
        cmd.args(&args[1..]);
        cmd
    }
}

impl Solver for CommandSolver {
    #[instrument(skip_all, fields(input = %request.input_dir.display()))]
    fn solve(&self, request: &SolveRequest) -> Result<()> {
        ensure_dir(&request.output_dir)?;
        info!(output = %request.output_dir.display(), "starting solve");

        let output = run_command_with_timeout(
            self.build(request),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run solver")?;
        output.write_log(&request.log_path, "solver")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "solver timed out");
        } else if !output.success() {
            warn!(exit_code = ?output.status.code(), log = %request.log_path.display(), "solver failed");
        } else {
            debug!("solver exited successfully");
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;

    use super::*;

    fn request(root: &std::path::Path) -> SolveRequest {
        SolveRequest {
            input_dir: root.join("in"),
            output_dir: root.join("out"),
            log_path: root.join("logs/solve.log"),
        }
    }

    fn solver(script: &str) -> CommandSolver {
        CommandSolver::new(
            vec![
                "sh".to_string(),
                "-c".to_string(),
                script.to_string(),
            ],
            Duration::from_secs(5),
            10_000,
        )
        .expect("solver")
    }

    #[test]
    fn placeholders_are_substituted() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path());
        solver("echo ok > {output}/result.csv; echo {input}")
            .solve(&req)
            .expect("solve");
        assert!(req.output_dir.join("result.csv").is_file());
        let log = fs::read_to_string(&req.log_path).expect("log");
        assert!(log.contains(&req.input_dir.display().to_string()));
    }

    #[test]
    fn failing_solver_is_not_an_error_and_leaves_output_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let req = request(temp.path());
        solver("exit 1").solve(&req).expect("solve");
        assert!(crate::io::dirs::is_empty_dir(&req.output_dir).expect("empty"));
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandSolver::new(Vec::new(), Duration::from_secs(1), 1).is_err());
        assert!(CommandSolver::new(vec![" ".to_string()], Duration::from_secs(1), 1).is_err());
    }
}
