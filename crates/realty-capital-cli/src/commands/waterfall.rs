use clap::Args;
use serde_json::Value;

use realty_capital_core::waterfall::{self, WaterfallInput};

use crate::input;

/// Arguments for the equity waterfall
#[derive(Args)]
pub struct WaterfallArgs {
    /// Path to JSON or YAML input file (ownerCashFlows, equityClasses, tiers)
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_waterfall(args: WaterfallArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let waterfall_input: WaterfallInput = input::load(args.input.as_deref(), "the equity waterfall")?;
    let result = waterfall::run_waterfall(&waterfall_input)?;
    Ok(serde_json::to_value(result)?)
}
