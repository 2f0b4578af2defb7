use clap::Args;
use serde_json::Value;

use realty_capital_core::capital::{self, CapitalInput};

use crate::input;

/// Arguments for the capital engine
#[derive(Args)]
pub struct CapitalArgs {
    /// Path to JSON or YAML input file (unleveredFcf, noi, tranches, ...)
    #[arg(long)]
    pub input: Option<String>,

    /// Include per-tranche monthly schedules
    #[arg(long)]
    pub monthly: bool,
}

pub fn run_capital(args: CapitalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut capital_input: CapitalInput = input::load(args.input.as_deref(), "the capital engine")?;
    capital_input.include_monthly |= args.monthly;
    let result = capital::run_capital_engine(&capital_input)?;
    Ok(serde_json::to_value(result)?)
}
