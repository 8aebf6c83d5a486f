//! Orchestration for `stepwise run`: the step-by-step scenario-tree executor.
//!
//! Each step, in order: split the base data, expand the tree level, prepare
//! pending nodes, solve them through the configured strategy, classify the
//! outputs, finalize solved nodes, clean up the consumed raw outputs and
//! persist the run state. Step `s+1` starts only after every node of step `s`
//! is terminal.

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::core::invariants::validate_invariants;
use crate::core::layout::Layout;
use crate::core::plan::{StepPlan, plan_steps};
use crate::core::tree::ScenarioTree;
use crate::core::types::{NodeStatus, StepCounts, VoidReason};
use crate::errors::ConfigurationError;
use crate::exit_codes;
use crate::io::catalog::ScenarioCatalog;
use crate::io::config::RunOptions;
use crate::io::dirs::{is_empty_dir, remove_dir_if_exists};
use crate::io::finalize::finalize_result;
use crate::io::model_data::{read_horizon, write_step_base};
use crate::io::prepare::prepare_node_input;
use crate::io::run_store::{RunState, write_run_state};
use crate::io::solver::SolveRequest;
use crate::io::strategy::{SolveJob, SolveStrategy};

/// Everything validated up front, before any directory is created.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub options: RunOptions,
    pub plan: StepPlan,
    pub catalog: ScenarioCatalog,
    pub layout: Layout,
}

/// Validate inputs and build the year plan and catalog.
///
/// Reads only; a configuration or catalog error here leaves the filesystem
/// untouched.
#[instrument(skip_all, fields(input = %options.input_data.display()))]
pub fn prepare_run(options: RunOptions) -> Result<PreparedRun> {
    if !options.input_data.is_dir() {
        return Err(ConfigurationError::new(format!(
            "input data directory {} does not exist",
            options.input_data.display()
        ))
        .into());
    }
    let horizon = read_horizon(&options.input_data)?;
    let plan = plan_steps(options.step_length, &horizon)?;
    let catalog = match &options.catalog_dir {
        Some(dir) => ScenarioCatalog::load(dir, plan.num_steps())?,
        None => ScenarioCatalog::empty(plan.num_steps()),
    };
    catalog.validate_against(&options.input_data)?;
    let layout = options.config.layout();
    debug!(
        steps = plan.num_steps(),
        first_year = horizon.first().copied(),
        last_year = horizon.last().copied(),
        "run prepared"
    );
    Ok(PreparedRun {
        options,
        plan,
        catalog,
        layout,
    })
}

/// Result of a complete stepwise run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub tree: ScenarioTree,
    pub counts: Vec<StepCounts>,
    /// True if any node at any step ended `void`.
    pub any_void: bool,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.any_void {
            exit_codes::VOIDED
        } else {
            exit_codes::OK
        }
    }
}

/// Run every step of `run` through `strategy`.
pub fn run_stepwise<S: SolveStrategy + ?Sized>(run: &PreparedRun, strategy: &S) -> Result<RunOutcome> {
    info!(
        steps = run.plan.num_steps(),
        strategy = strategy.name(),
        "starting stepwise run"
    );
    let mut tree = ScenarioTree::default();
    let mut counts = Vec::with_capacity(run.plan.num_steps());

    for step in 0..run.plan.num_steps() {
        let step_counts = run_step(run, strategy, &mut tree, step)?;
        counts.push(step_counts);

        let errors = validate_invariants(&tree);
        if !errors.is_empty() {
            bail!("scenario tree invariants violated:\n{}", errors.join("\n"));
        }
        write_run_state(
            &run.layout.run_state_path(),
            &RunState {
                solver: run.options.solver.clone(),
                num_steps: run.plan.num_steps(),
                completed_steps: step + 1,
                tree: tree.clone(),
            },
        )?;
    }

    let any_void = counts.iter().any(|c| c.void + c.inherited_void > 0);
    info!(any_void, "stepwise run finished");
    Ok(RunOutcome {
        tree,
        counts,
        any_void,
    })
}

#[instrument(skip_all, fields(step = step))]
fn run_step<S: SolveStrategy + ?Sized>(
    run: &PreparedRun,
    strategy: &S,
    tree: &mut ScenarioTree,
    step: usize,
) -> Result<StepCounts> {
    let config = &run.options.config;
    let layout = &run.layout;
    let years = run.plan.years(step).to_vec();
    let window = run.plan.solve_window(step, config.lookahead_years);

    let base_dir = layout.base_data_dir(step);
    write_step_base(&run.options.input_data, &base_dir, &window)
        .with_context(|| format!("split base data for step {step}"))?;

    tree.expand(run.catalog.labels(step), years.clone(), layout)?;
    let parent_finals: Vec<Option<PathBuf>> = {
        let level = tree.level(step).ok_or_else(|| anyhow!("missing level {step}"))?;
        level
            .nodes
            .iter()
            .map(|node| tree.parent_of(node).map(|p| p.locations.final_dir.clone()))
            .collect()
    };

    let level = &mut tree.levels[step];
    let ledger = &mut tree.ledger;
    info!(
        nodes = level.nodes.len(),
        pending = level.pending_indices().len(),
        years = ?years,
        "step level built"
    );

    // Propagation and option application.
    let mut jobs = Vec::new();
    for idx in level.pending_indices() {
        let node = &mut level.nodes[idx];
        let overrides = run.catalog.path_overrides(&node.path);
        let prepared = remove_dir_if_exists(&node.locations.raw_dir).and_then(|()| {
            prepare_node_input(
                &base_dir,
                parent_finals[idx].as_deref(),
                &node.locations.input_dir,
                &overrides,
                &window,
            )
        });
        match prepared {
            Ok(summary) => {
                debug!(path = %node.path, ?summary, "node prepared");
                node.begin_solve()?;
                jobs.push((
                    idx,
                    SolveJob {
                        path: node.path.to_string(),
                        request: SolveRequest {
                            input_dir: node.locations.input_dir.clone(),
                            output_dir: node.locations.raw_dir.clone(),
                            log_path: node.locations.log_path.clone(),
                        },
                    },
                ));
            }
            Err(err) => {
                warn!(path = %node.path, err = %format!("{err:#}"), "node preparation failed");
                node.mark_void(VoidReason::PrepareFailed {
                    message: format!("{err:#}"),
                })?;
                ledger.record(node.path.clone());
            }
        }
    }

    let (indices, jobs): (Vec<usize>, Vec<SolveJob>) = jobs.into_iter().unzip();
    strategy.solve_step(step, &jobs, &layout.batch_dir(step))?;

    // Failure detection and finalization.
    for idx in indices {
        let node = &mut level.nodes[idx];
        let empty = is_empty_dir(&node.locations.raw_dir).unwrap_or_else(|err| {
            warn!(path = %node.path, err = %format!("{err:#}"), "cannot read solve output");
            true
        });
        if empty {
            info!(path = %node.path, "solve produced no output; voiding scenario");
            node.mark_void(VoidReason::EmptyOutput)?;
            ledger.record(node.path.clone());
            continue;
        }

        match finalize_result(
            &node.locations.raw_dir,
            parent_finals[idx].as_deref(),
            step,
            &years,
            &node.locations.final_dir,
        ) {
            Ok(summary) => {
                debug!(path = %node.path, ?summary, "node finalized");
                node.mark_solved()?;
            }
            Err(err) => {
                warn!(path = %node.path, err = %format!("{err:#}"), "finalization failed; voiding scenario");
                node.mark_void(VoidReason::FinalizeFailed {
                    message: format!("{err:#}"),
                })?;
                ledger.record(node.path.clone());
            }
        }
    }

    if !level.is_finished() {
        bail!("step {step} left non-terminal nodes");
    }

    // A void node has no result, including one left by an earlier run.
    for node in level.nodes.iter().filter(|n| n.status() == NodeStatus::Void) {
        remove_dir_if_exists(&node.locations.final_dir)
            .with_context(|| format!("remove stale result of {}", node.path))?;
    }

    if step > 0 && !config.keep_raw_results {
        remove_dir_if_exists(&layout.raw_step_dir(step - 1))
            .with_context(|| format!("clean up raw results of step {}", step - 1))?;
    }

    let counts = level.counts();
    for node in &level.nodes {
        debug!(path = %node.path, status = node.status().as_str(), "node finished");
    }
    info!(
        solved = counts.solved,
        void = counts.void,
        inherited_void = counts.inherited_void,
        "step finished"
    );
    if counts.solved == 0 {
        warn!("every scenario at this step is void");
    }
    Ok(counts)
}
