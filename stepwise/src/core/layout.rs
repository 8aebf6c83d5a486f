//! Canonical on-disk locations for steps and scenario nodes.
//!
//! Pure path arithmetic; nothing here touches the filesystem. Every root is
//! split per step (`step{s}`), then nested by the non-trivial labels of the
//! scenario path, so all nodes of one step sit at the same depth.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::scenario_path::ScenarioPath;

/// Where one node reads its input and writes its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLocations {
    /// Working input dataset (seeded from the step base, then overridden).
    pub input_dir: PathBuf,
    /// Solver output directory; empty after the solve means failure.
    pub raw_dir: PathBuf,
    /// Finalized, step-scoped results read by the next step.
    pub final_dir: PathBuf,
    /// Solver stdout/stderr log.
    pub log_path: PathBuf,
}

/// The three parallel trees (plus logs) rooted at configured directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub data_root: PathBuf,
    pub work_root: PathBuf,
    pub results_root: PathBuf,
    pub logs_root: PathBuf,
}

impl Layout {
    pub fn new(
        data_root: impl Into<PathBuf>,
        work_root: impl Into<PathBuf>,
        results_root: impl Into<PathBuf>,
        logs_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            work_root: work_root.into(),
            results_root: results_root.into(),
            logs_root: logs_root.into(),
        }
    }

    /// Split base data for `step`, before any option is applied.
    pub fn base_data_dir(&self, step: usize) -> PathBuf {
        step_dir(&self.data_root, step).join("base")
    }

    /// Raw solver outputs of every node at `step`.
    pub fn raw_step_dir(&self, step: usize) -> PathBuf {
        step_dir(&self.work_root, step)
    }

    /// Scratch directory for a delegated batch (descriptor + Snakefile).
    pub fn batch_dir(&self, step: usize) -> PathBuf {
        self.work_root.join("batches").join(format!("step{step}"))
    }

    pub fn run_state_path(&self) -> PathBuf {
        self.results_root.join("run_state.json")
    }

    pub fn locate(&self, step: usize, path: &ScenarioPath) -> NodeLocations {
        NodeLocations {
            input_dir: nested(&step_dir(&self.data_root, step), path).join("data"),
            raw_dir: nested(&step_dir(&self.work_root, step), path),
            final_dir: nested(&step_dir(&self.results_root, step), path),
            log_path: nested(&step_dir(&self.logs_root, step), path).join("solve.log"),
        }
    }
}

fn step_dir(root: &Path, step: usize) -> PathBuf {
    root.join(format!("step{step}"))
}

fn nested(base: &Path, path: &ScenarioPath) -> PathBuf {
    path.segments().fold(base.to_path_buf(), |acc, seg| acc.join(seg))
}
