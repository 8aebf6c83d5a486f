//! Stepwise scenario-tree execution for energy-system models.
//!
//! Splits the model horizon into steps, branches each step into the scenario
//! options of a catalog, and solves the resulting tree step by step, carrying
//! each scenario's results into its children and voiding every branch below a
//! failed solve.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use stepwise::errors::{CatalogError, ConfigurationError};
use stepwise::exit_codes;
use stepwise::io::config::{DEFAULT_CONFIG_FILE, RunOptions, RunOverrides, load_config};
use stepwise::io::strategy::strategy_from_options;
use stepwise::logging;
use stepwise::plan::plan_report;
use stepwise::step::{prepare_run, run_stepwise};

#[derive(Parser)]
#[command(
    name = "stepwise",
    version,
    about = "Stepwise scenario-tree execution for energy-system models"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Solve every step of the scenario tree.
    Run(RunArgs),
    /// Print the year plan and per-step options without creating anything.
    Plan {
        #[command(flatten)]
        args: RunArgs,
        /// Print the plan as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    /// Step length in years; give two values for a distinct first step.
    #[arg(long = "step-length", value_name = "YEARS", num_args = 1..=2, allow_negative_numbers = true)]
    step_length: Vec<i64>,
    /// Directory with the model's input CSV tables.
    #[arg(long = "input-data", value_name = "DIR")]
    input_data: Option<PathBuf>,
    /// Named solver; hands each step to the pipeline runner.
    #[arg(long)]
    solver: Option<String>,
    /// Cores the pipeline runner may use.
    #[arg(long)]
    cores: Option<usize>,
    /// Scenario catalog directory.
    #[arg(long = "path-param", value_name = "DIR")]
    path_param: Option<PathBuf>,
    /// Configuration file.
    #[arg(long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
}

impl RunArgs {
    fn options(&self) -> Result<RunOptions> {
        let config = load_config(&self.config)?;
        RunOptions::merge(
            config,
            RunOverrides {
                input_data: self.input_data.clone(),
                step_length: self.step_length.clone(),
                path_param: self.path_param.clone(),
                solver: self.solver.clone(),
                cores: self.cores,
            },
        )
    }
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = match err.print() {
                Ok(()) => usage_exit_code(&err),
                Err(print_err) => {
                    eprintln!("cannot print usage: {print_err}");
                    exit_codes::INVALID
                }
            };
            std::process::exit(code);
        }
    };
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            if let Some(config) = err.downcast_ref::<ConfigurationError>() {
                eprintln!("{config}");
            } else if let Some(catalog) = err.downcast_ref::<CatalogError>() {
                eprintln!("{catalog}");
            } else {
                eprintln!("{:#}", err);
            }
            std::process::exit(exit_codes::INVALID);
        }
    }
}

/// Usage errors exit `INVALID`, since clap's own code `2` means voided here.
/// `--help` and `--version` exit `OK`.
fn usage_exit_code(err: &clap::Error) -> i32 {
    if err.use_stderr() {
        exit_codes::INVALID
    } else {
        exit_codes::OK
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Plan { args, json } => cmd_plan(&args, json),
    }
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let prepared = prepare_run(args.options()?)?;
    logging::init(prepared.options.config.log_path().as_deref())?;
    let strategy = strategy_from_options(&prepared.options)?;
    let outcome = run_stepwise(&prepared, strategy.as_ref())?;

    for counts in &outcome.counts {
        println!(
            "step {}: {} solved, {} void, {} void by ancestry",
            counts.step, counts.solved, counts.void, counts.inherited_void
        );
    }
    println!("run state: {}", prepared.layout.run_state_path().display());
    Ok(outcome.exit_code())
}

fn cmd_plan(args: &RunArgs, json: bool) -> Result<i32> {
    logging::init(None)?;
    let prepared = prepare_run(args.options()?)?;
    let report = plan_report(&prepared);
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(exit_codes::OK)
}
