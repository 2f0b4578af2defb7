use clap::Args;
use colored::Colorize;
use serde_json::Value;

use realty_capital_core::monte_carlo::{self, SimulationHooks, SimulationInput};
use realty_capital_core::scenarios::StabilizedOperations;

use crate::input;

/// Arguments for the Monte Carlo deal simulation
#[derive(Args)]
pub struct MonteCarloArgs {
    /// Path to JSON or YAML input file ({scenario, config})
    #[arg(long)]
    pub input: Option<String>,

    /// Number of iterations (overrides config.iterations)
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Random seed (overrides config.seed)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Worker threads (overrides config.workers)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Report progress on stderr
    #[arg(long)]
    pub progress: bool,

    /// Omit per-iteration KPI snapshots from the output
    #[arg(long)]
    pub summary_only: bool,
}

pub fn run_monte_carlo(args: MonteCarloArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut sim_input: SimulationInput = input::load(args.input.as_deref(), "Monte Carlo simulation")?;
    if let Some(iterations) = args.iterations {
        sim_input.config.iterations = iterations;
    }
    if args.seed.is_some() {
        sim_input.config.seed = args.seed;
    }
    if args.workers.is_some() {
        sim_input.config.workers = args.workers;
    }

    let report = |pct: u8| {
        if pct % 10 == 0 {
            eprintln!("{} {pct}%", "progress".cyan());
        }
    };
    let hooks = SimulationHooks {
        on_progress: args.progress.then_some(&report as &(dyn Fn(u8) + Sync)),
        cancel: None,
    };

    let mut result = monte_carlo::run_monte_carlo(&StabilizedOperations, &sim_input, hooks)?;
    if args.summary_only {
        result.result.iterations.clear();
    }
    Ok(serde_json::to_value(result)?)
}
