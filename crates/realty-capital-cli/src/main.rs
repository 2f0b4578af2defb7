mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::capital::CapitalArgs;
use commands::debt::DebtScheduleArgs;
use commands::monte_carlo::MonteCarloArgs;
use commands::scenarios::ScenariosArgs;
use commands::waterfall::WaterfallArgs;

/// Capital structure, equity waterfall and risk analysis for mixed-use
/// real-estate deals
#[derive(Parser)]
#[command(
    name = "rcap",
    version,
    about = "Capital structure, equity waterfall and risk analysis for mixed-use real estate",
    long_about = "A CLI for scheduling debt tranches, bridging unlevered to levered cash flow, \
                  running multi-tier equity waterfalls with catch-up and clawback, comparing \
                  Base / Stress / Upside cases and running Monte Carlo simulations over deal \
                  drivers. Inputs are JSON or YAML documents."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log filter for stderr (e.g. "warn", "realty_capital=debug"); defaults to RUST_LOG
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the monthly and annual schedule of a single debt tranche
    DebtSchedule(DebtScheduleArgs),
    /// Bridge unlevered to levered cash flow across all tranches
    Capital(CapitalArgs),
    /// Distribute owner cash flow through an equity waterfall
    Waterfall(WaterfallArgs),
    /// Compare Base / Stress / Upside cases of a deal
    Scenarios(ScenariosArgs),
    /// Run a Monte Carlo simulation over occupancy, rate and interest drivers
    MonteCarlo(MonteCarloArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::DebtSchedule(args) => commands::debt::run_debt_schedule(args),
        Commands::Capital(args) => commands::capital::run_capital(args),
        Commands::Waterfall(args) => commands::waterfall::run_waterfall(args),
        Commands::Scenarios(args) => commands::scenarios::run_scenarios(args),
        Commands::MonteCarlo(args) => commands::monte_carlo::run_monte_carlo(args),
        Commands::Version => {
            println!("rcap {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
