use clap::Args;
use serde_json::Value;

use realty_capital_core::scenarios::{
    self, ComparisonInput, DealScenario, StabilizedOperations, DEFAULT_STRESS_FACTOR,
};

use crate::input;

/// Arguments for the Base / Stress / Upside comparison
#[derive(Args)]
pub struct ScenariosArgs {
    /// Path to JSON or YAML input file ({scenario, stressFactor} or a bare scenario)
    #[arg(long)]
    pub input: Option<String>,

    /// Symmetric move of occupancy and rate (overrides the input file)
    #[arg(long)]
    pub stress_factor: Option<f64>,

    /// Evaluate the base case only and return the full pipeline output
    #[arg(long)]
    pub base_only: bool,
}

pub fn run_scenarios(args: ScenariosArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let document: Value = input::load(args.input.as_deref(), "scenario comparison")?;
    let mut comparison: ComparisonInput = if document.get("scenario").is_some() {
        serde_json::from_value(document)?
    } else {
        let scenario: DealScenario = serde_json::from_value(document)?;
        ComparisonInput {
            scenario,
            stress_factor: DEFAULT_STRESS_FACTOR,
        }
    };
    if let Some(factor) = args.stress_factor {
        comparison.stress_factor = factor;
    }

    if args.base_only {
        let result = scenarios::evaluate_deal(&StabilizedOperations, &comparison.scenario)?;
        return Ok(serde_json::to_value(result)?);
    }
    let result = scenarios::compare_scenarios(&StabilizedOperations, &comparison)?;
    Ok(serde_json::to_value(result)?)
}
