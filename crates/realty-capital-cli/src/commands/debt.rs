use clap::Args;
use serde_json::Value;

use realty_capital_core::debt::{self, DebtScheduleInput};

use crate::input;

/// Arguments for a single-tranche debt schedule
#[derive(Args)]
pub struct DebtScheduleArgs {
    /// Path to JSON or YAML input file ({tranche, horizonYears, repayAtHorizon})
    #[arg(long)]
    pub input: Option<String>,

    /// Override the horizon in years
    #[arg(long)]
    pub horizon: Option<u32>,

    /// Include the monthly schedule in the output
    #[arg(long)]
    pub monthly: bool,
}

pub fn run_debt_schedule(args: DebtScheduleArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut schedule_input: DebtScheduleInput = input::load(args.input.as_deref(), "debt schedule")?;
    if let Some(horizon) = args.horizon {
        schedule_input.horizon_years = horizon;
    }

    let mut result = debt::build_debt_schedule(&schedule_input)?;
    if !args.monthly {
        result.result.monthly.clear();
    }
    Ok(serde_json::to_value(result)?)
}
