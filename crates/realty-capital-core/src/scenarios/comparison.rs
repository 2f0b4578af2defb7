use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::CapitalError;
use crate::scenarios::deal::{DealScenario, DriverShocks};
use crate::scenarios::operations::RevenueEngine;
use crate::scenarios::pipeline::{run_pipeline, Kpi, KpiSnapshot};
use crate::types::*;
use crate::CapitalResult;

/// Default symmetric move applied to the revenue drivers.
pub const DEFAULT_STRESS_FACTOR: f64 = 0.10;

fn default_stress_factor() -> f64 {
    DEFAULT_STRESS_FACTOR
}

/// Input for a Base / Stress / Upside comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonInput {
    pub scenario: DealScenario,
    /// Fractional move of occupancy and rate (0.10 = +/-10%)
    #[serde(default = "default_stress_factor")]
    pub stress_factor: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioCase {
    Base,
    Stress,
    Upside,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseResult {
    pub case: ScenarioCase,
    pub shocks: DriverShocks,
    pub kpis: KpiSnapshot,
}

/// One KPI across the three cases, with deviations from base.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiTriad {
    pub kpi: Kpi,
    pub base: Option<f64>,
    pub stress: Option<f64>,
    pub upside: Option<f64>,
    pub stress_deviation: Option<f64>,
    pub upside_deviation: Option<f64>,
    pub stress_deviation_pct: Option<f64>,
    pub upside_deviation_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioComparison {
    pub stress_factor: f64,
    pub cases: Vec<CaseResult>,
    pub triads: Vec<KpiTriad>,
}

/// Re-run the whole pipeline with revenue drivers moved down and up by
/// `stress_factor` and compare every KPI to the base case.
pub fn compare_scenarios(
    engine: &dyn RevenueEngine,
    input: &ComparisonInput,
) -> CapitalResult<ComputationOutput<ScenarioComparison>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let factor = input.stress_factor;
    if !factor.is_finite() || !(0.0..1.0).contains(&factor) {
        return Err(CapitalError::InvalidInput {
            field: "stressFactor".into(),
            reason: format!("Stress factor must be within [0, 1) (got {factor})"),
        });
    }

    let plan = [
        (ScenarioCase::Base, DriverShocks::IDENTITY),
        (ScenarioCase::Stress, DriverShocks::revenue(1.0 - factor)),
        (ScenarioCase::Upside, DriverShocks::revenue(1.0 + factor)),
    ];

    let mut cases = Vec::with_capacity(plan.len());
    for (case, shocks) in plan {
        let scenario = input.scenario.perturbed(&shocks);
        let mut case_warnings = Vec::new();
        let output = run_pipeline(engine, &scenario, &mut case_warnings)?;
        warnings.extend(case_warnings.into_iter().map(|w| format!("{case:?}: {w}")));
        cases.push(CaseResult {
            case,
            shocks,
            kpis: output.kpis,
        });
    }

    let (base, stress, upside) = (cases[0].kpis, cases[1].kpis, cases[2].kpis);
    let triads = Kpi::ALL
        .iter()
        .map(|&kpi| {
            let b = base.get(kpi);
            let (s, u) = (stress.get(kpi), upside.get(kpi));
            KpiTriad {
                kpi,
                base: b,
                stress: s,
                upside: u,
                stress_deviation: deviation(b, s),
                upside_deviation: deviation(b, u),
                stress_deviation_pct: deviation_pct(kpi, b, s, &mut warnings),
                upside_deviation_pct: deviation_pct(kpi, b, u, &mut warnings),
            }
        })
        .collect();

    tracing::debug!(stress_factor = factor, "scenario comparison complete");

    let output = ScenarioComparison {
        stress_factor: factor,
        cases,
        triads,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Base / Stress / Upside Scenario Comparison",
        &serde_json::json!({
            "scenario": input.scenario.name,
            "stress_factor": factor,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn deviation(base: Option<f64>, value: Option<f64>) -> Option<f64> {
    Some(value? - base?)
}

fn deviation_pct(
    kpi: Kpi,
    base: Option<f64>,
    value: Option<f64>,
    warnings: &mut Vec<String>,
) -> Option<f64> {
    let (b, v) = (base?, value?);
    if b == 0.0 {
        if v != 0.0 {
            warnings.push(format!(
                "Base case {kpi} is zero; cannot compute a percentage deviation"
            ));
        }
        return None;
    }
    Some((v - b) / b.abs())
}
