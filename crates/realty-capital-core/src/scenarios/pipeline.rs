use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::capital::engine::{compute_capital_structure, CapitalEngineResult, CapitalInput};
use crate::scenarios::deal::DealScenario;
use crate::scenarios::operations::{OperatingProjection, RevenueEngine};
use crate::time_value::{irr_opt, npv};
use crate::types::*;
use crate::waterfall::engine::{compute_waterfall, WaterfallInput, WaterfallResult};
use crate::waterfall::returns::equity_multiple;
use crate::CapitalResult;

// ---------------------------------------------------------------------------
// KPIs
// ---------------------------------------------------------------------------

/// Headline metrics tracked across scenarios and simulation iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Kpi {
    Npv,
    UnleveredIrr,
    LeveredIrr,
    Moic,
    EquityMultiple,
    Wacc,
    MinDscr,
}

impl Kpi {
    pub const ALL: [Kpi; 7] = [
        Kpi::Npv,
        Kpi::UnleveredIrr,
        Kpi::LeveredIrr,
        Kpi::Moic,
        Kpi::EquityMultiple,
        Kpi::Wacc,
        Kpi::MinDscr,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Kpi::Npv => "NPV",
            Kpi::UnleveredIrr => "Unlevered IRR",
            Kpi::LeveredIrr => "Levered IRR",
            Kpi::Moic => "MOIC",
            Kpi::EquityMultiple => "Equity Multiple",
            Kpi::Wacc => "WACC",
            Kpi::MinDscr => "Min DSCR",
        }
    }
}

impl fmt::Display for Kpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// KPI values of one pipeline run. A KPI is `None` when it is undefined for
/// the run (no sign change for IRR, no debt service for DSCR).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSnapshot {
    pub npv: Option<f64>,
    pub unlevered_irr: Option<f64>,
    pub levered_irr: Option<f64>,
    pub moic: Option<f64>,
    pub equity_multiple: Option<f64>,
    pub wacc: Option<f64>,
    pub min_dscr: Option<f64>,
}

impl KpiSnapshot {
    pub fn get(&self, kpi: Kpi) -> Option<f64> {
        match kpi {
            Kpi::Npv => self.npv,
            Kpi::UnleveredIrr => self.unlevered_irr,
            Kpi::LeveredIrr => self.levered_irr,
            Kpi::Moic => self.moic,
            Kpi::EquityMultiple => self.equity_multiple,
            Kpi::Wacc => self.wacc,
            Kpi::MinDscr => self.min_dscr,
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Everything one pass of revenue -> debt -> capital -> waterfall produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub scenario: String,
    pub projection: OperatingProjection,
    pub capital: CapitalEngineResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waterfall: Option<WaterfallResult>,
    pub kpis: KpiSnapshot,
}

/// Run the full pipeline for one scenario. The scenario is only read.
pub fn run_pipeline(
    engine: &dyn RevenueEngine,
    scenario: &DealScenario,
    warnings: &mut Vec<String>,
) -> CapitalResult<PipelineOutput> {
    let projection = engine.project(scenario)?;

    let capital_input = CapitalInput {
        unlevered_fcf: projection.unlevered_fcf.clone(),
        noi: projection.noi.clone(),
        tranches: scenario.capital.tranches.clone(),
        horizon_years: Some(scenario.horizon_years),
        initial_investment: scenario.capital.initial_investment,
        repay_debt_at_exit: scenario.capital.repay_debt_at_exit,
        include_monthly: false,
    };
    let capital = compute_capital_structure(&capital_input, warnings)?;
    let equity_flows = capital.equity_cash_flows();

    let waterfall = match &scenario.equity {
        Some(equity) => Some(compute_waterfall(
            &WaterfallInput {
                owner_cash_flows: equity_flows.clone(),
                equity_classes: equity.equity_classes.clone(),
                tiers: equity.tiers.clone(),
            },
            warnings,
        )?),
        None => None,
    };

    let kpis = snapshot(scenario, &projection, &capital, waterfall.as_ref(), &equity_flows)?;

    Ok(PipelineOutput {
        scenario: scenario.name.clone(),
        projection,
        capital,
        waterfall,
        kpis,
    })
}

/// Run the pipeline and wrap the output with metadata.
pub fn evaluate_deal(
    engine: &dyn RevenueEngine,
    scenario: &DealScenario,
) -> CapitalResult<ComputationOutput<PipelineOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = run_pipeline(engine, scenario, &mut warnings)?;
    for warning in &warnings {
        tracing::warn!(target: "realty_capital::pipeline", "{warning}");
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Deal Pipeline (operations, debt, capital, waterfall)",
        &serde_json::json!({
            "scenario": scenario.name,
            "horizon_years": scenario.horizon_years,
            "tranches": scenario.capital.tranches.len(),
            "discount_rate": scenario.valuation.discount_rate.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn snapshot(
    scenario: &DealScenario,
    projection: &OperatingProjection,
    capital: &CapitalEngineResult,
    waterfall: Option<&WaterfallResult>,
    equity_flows: &[Money],
) -> CapitalResult<KpiSnapshot> {
    let npv_value = npv(scenario.valuation.discount_rate, &projection.unlevered_fcf)?;
    let multiple = equity_multiple(equity_flows);
    let moic = match waterfall {
        Some(w) => w.aggregate_moic(),
        None => multiple,
    };

    Ok(KpiSnapshot {
        npv: npv_value.to_f64(),
        unlevered_irr: irr_opt(&projection.unlevered_fcf).and_then(|r| r.to_f64()),
        levered_irr: irr_opt(equity_flows).and_then(|r| r.to_f64()),
        moic: moic.and_then(|m| m.to_f64()),
        equity_multiple: multiple.and_then(|m| m.to_f64()),
        wacc: wacc(scenario).and_then(|w| w.to_f64()),
        min_dscr: capital.min_dscr.and_then(|d| d.to_f64()),
    })
}

/// Weighted average cost of capital at close, without a tax shield.
/// Debt cost is the principal-weighted tranche rate.
pub fn wacc(scenario: &DealScenario) -> Option<Rate> {
    let debt: Money = scenario.total_debt();
    let equity = (scenario.capital.initial_investment - debt).max(Decimal::ZERO);
    let value = equity + debt;
    if value <= Decimal::ZERO {
        return None;
    }
    let cost_of_equity = scenario
        .valuation
        .cost_of_equity
        .unwrap_or(scenario.valuation.discount_rate);
    let debt_cost: Money = scenario
        .capital
        .tranches
        .iter()
        .filter_map(|t| t.principal.map(|p| p * t.interest_rate))
        .sum();
    Some(equity / value * cost_of_equity + debt_cost / value)
}
