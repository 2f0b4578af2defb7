use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::debt::schedule::{build_tranche_schedule, DebtScheduleEntry, ForcedRepayment, TrancheSchedule};
use crate::debt::tranche::{DebtTranche, Seniority};
use crate::error::CapitalError;
use crate::types::*;
use crate::CapitalResult;

/// Lender covenant floor for debt service coverage.
pub const DSCR_COVENANT: Decimal = dec!(1.20);
/// Leverage ceiling above which a deal is flagged as highly levered.
pub const LTV_CEILING: Decimal = dec!(0.80);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to the capital engine. Series are indexed by year, index 0 being
/// the acquisition / drawdown year.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalInput {
    /// Unlevered free cash flow per year (year 0 is usually the negative
    /// acquisition cost)
    pub unlevered_fcf: Vec<Money>,
    /// Net operating income per year. Years without NOI report no DSCR.
    #[serde(default)]
    pub noi: Vec<Money>,
    #[serde(default)]
    pub tranches: Vec<DebtTranche>,
    /// Defaults to the last year covered by `unlevered_fcf`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizon_years: Option<u32>,
    /// Total project cost, the LTV denominator
    pub initial_investment: Money,
    /// Repay any balance still outstanding in the final horizon year
    #[serde(default)]
    pub repay_debt_at_exit: bool,
    /// Carry each tranche's monthly schedule in the result
    #[serde(default)]
    pub include_monthly: bool,
}

/// One year of the levered cash-flow bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeveredFcfEntry {
    pub year: u32,
    pub unlevered_fcf: Money,
    pub interest: Money,
    pub principal: Money,
    /// Origination fees in the drawdown year plus exit fees on repaid balances
    pub transaction_costs: Money,
    pub total_debt_service: Money,
    /// `unlevered_fcf - (interest + principal + transaction_costs)`
    pub levered_fcf: Money,
    /// Principal drawn this year
    pub debt_proceeds: Money,
    /// Owner-level equity cash flow: `levered_fcf + debt_proceeds`
    pub equity_cash_flow: Money,
    /// Total balance outstanding at year end
    pub outstanding_debt: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtKpi {
    pub year: u32,
    /// NOI / (interest + principal); absent when there is no debt service
    pub dscr: Option<Decimal>,
    /// Outstanding debt / initial investment
    pub ltv: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub senior_dscr: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrancheYearKpi {
    pub year: u32,
    pub debt_service: Money,
    pub dscr: Option<Decimal>,
}

/// Per-tranche roll-up of the schedule within the horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrancheSummary {
    pub tranche_id: String,
    pub seniority: Seniority,
    pub principal: Money,
    pub total_interest: Money,
    pub total_principal: Money,
    pub origination_fee: Money,
    pub exit_fees: Money,
    pub ending_balance: Money,
    pub schedule: Vec<DebtScheduleEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monthly_schedule: Option<Vec<DebtScheduleEntry>>,
    pub repayments: Vec<ForcedRepayment>,
    pub coverage: Vec<TrancheYearKpi>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalEngineResult {
    pub horizon_years: u32,
    pub levered_fcf: Vec<LeveredFcfEntry>,
    pub debt_kpis: Vec<DebtKpi>,
    pub tranches: Vec<TrancheSummary>,
    pub total_debt: Money,
    pub min_dscr: Option<Decimal>,
    pub max_ltv: Option<Decimal>,
}

impl CapitalEngineResult {
    /// Owner-level cash flow series (equity in, distributions out).
    pub fn equity_cash_flows(&self) -> Vec<Money> {
        self.levered_fcf.iter().map(|e| e.equity_cash_flow).collect()
    }

    pub fn unlevered_cash_flows(&self) -> Vec<Money> {
        self.levered_fcf.iter().map(|e| e.unlevered_fcf).collect()
    }

    pub fn is_all_equity(&self) -> bool {
        self.tranches.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the capital engine: schedule every tranche, bridge unlevered to
/// levered cash flow and compute coverage and leverage per year.
pub fn run_capital_engine(
    input: &CapitalInput,
) -> CapitalResult<ComputationOutput<CapitalEngineResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = compute_capital_structure(input, &mut warnings)?;
    for warning in &warnings {
        tracing::warn!(target: "realty_capital::capital", "{warning}");
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Capital Engine (tranche schedules, levered FCF, DSCR/LTV)",
        &serde_json::json!({
            "horizon_years": output.horizon_years,
            "tranches": input.tranches.len(),
            "initial_investment": input.initial_investment.to_string(),
            "repay_debt_at_exit": input.repay_debt_at_exit,
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Core computation without the envelope. Warnings are appended to
/// `warnings`; scheduler errors propagate unchanged.
pub fn compute_capital_structure(
    input: &CapitalInput,
    warnings: &mut Vec<String>,
) -> CapitalResult<CapitalEngineResult> {
    let horizon = resolve_horizon(input)?;
    let years = horizon as usize + 1;

    tracing::debug!(
        tranches = input.tranches.len(),
        horizon,
        "running capital engine"
    );

    let mut interest = vec![Decimal::ZERO; years];
    let mut principal = vec![Decimal::ZERO; years];
    let mut costs = vec![Decimal::ZERO; years];
    let mut proceeds = vec![Decimal::ZERO; years];
    let mut outstanding = vec![Decimal::ZERO; years];
    let mut senior_service = vec![Decimal::ZERO; years];
    let mut has_senior = false;

    let mut schedules: Vec<(TrancheSchedule, &DebtTranche)> = Vec::with_capacity(input.tranches.len());
    for tranche in &input.tranches {
        let schedule = build_tranche_schedule(tranche, horizon, input.repay_debt_at_exit)?;
        if tranche.start_year > horizon {
            warnings.push(format!(
                "Tranche '{}' draws in year {} after the {horizon}-year horizon and is ignored",
                tranche.id, tranche.start_year
            ));
            continue;
        }
        schedules.push((schedule, tranche));
    }

    let mut summaries = Vec::with_capacity(schedules.len());
    for (schedule, tranche) in schedules {
        let draw_year = tranche.start_year as usize;
        let origination_fee = tranche.origination_fee_pct * schedule.initial_principal;
        proceeds[draw_year] += schedule.initial_principal;
        costs[draw_year] += origination_fee;

        let mut exit_fees = Decimal::ZERO;
        for repayment in &schedule.repayments {
            let fee = tranche.exit_fee_pct * repayment.amount;
            costs[repayment.year as usize] += fee;
            exit_fees += fee;
        }

        let is_senior = tranche.seniority == Seniority::Senior;
        has_senior |= is_senior;
        for entry in &schedule.annual {
            let y = entry.year as usize;
            interest[y] += entry.interest;
            principal[y] += entry.principal;
            if is_senior {
                senior_service[y] += entry.interest + entry.principal;
            }
        }
        for (y, slot) in outstanding.iter_mut().enumerate() {
            *slot += schedule.outstanding_at(y as u32);
        }

        let coverage = schedule
            .annual
            .iter()
            .map(|e| {
                let debt_service = e.interest + e.principal;
                TrancheYearKpi {
                    year: e.year,
                    debt_service,
                    dscr: coverage_ratio(input.noi.get(e.year as usize).copied(), debt_service),
                }
            })
            .collect();

        summaries.push(TrancheSummary {
            tranche_id: schedule.tranche_id.clone(),
            seniority: schedule.seniority,
            principal: schedule.initial_principal,
            total_interest: schedule.total_interest,
            total_principal: schedule.total_principal,
            origination_fee,
            exit_fees,
            ending_balance: schedule.final_balance(),
            monthly_schedule: input.include_monthly.then(|| schedule.monthly.clone()),
            repayments: schedule.repayments,
            schedule: schedule.annual,
            coverage,
        });
    }

    let mut levered_fcf = Vec::with_capacity(years);
    let mut debt_kpis = Vec::with_capacity(years);
    for y in 0..years {
        let year = y as u32;
        let unlevered = input.unlevered_fcf[y];
        let debt_service = interest[y] + principal[y];
        let levered = unlevered - (interest[y] + principal[y] + costs[y]);
        levered_fcf.push(LeveredFcfEntry {
            year,
            unlevered_fcf: unlevered,
            interest: interest[y],
            principal: principal[y],
            transaction_costs: costs[y],
            total_debt_service: debt_service,
            levered_fcf: levered,
            debt_proceeds: proceeds[y],
            equity_cash_flow: levered + proceeds[y],
            outstanding_debt: outstanding[y],
        });

        let noi = input.noi.get(y).copied();
        debt_kpis.push(DebtKpi {
            year,
            dscr: coverage_ratio(noi, debt_service),
            ltv: loan_to_value(outstanding[y], input.initial_investment),
            senior_dscr: if has_senior {
                coverage_ratio(noi, senior_service[y])
            } else {
                None
            },
        });
    }

    let min_dscr = debt_kpis.iter().filter_map(|k| k.dscr).min();
    let max_ltv = debt_kpis.iter().filter_map(|k| k.ltv).max();
    flag_covenants(&debt_kpis, warnings);

    if summaries.is_empty() {
        tracing::debug!("no debt tranches; levered cash flow equals unlevered");
    }

    Ok(CapitalEngineResult {
        horizon_years: horizon,
        total_debt: summaries.iter().map(|s| s.principal).sum(),
        levered_fcf,
        debt_kpis,
        tranches: summaries,
        min_dscr,
        max_ltv,
    })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn resolve_horizon(input: &CapitalInput) -> CapitalResult<u32> {
    if input.unlevered_fcf.is_empty() {
        return Err(CapitalError::InsufficientData(
            "unleveredFcf must contain at least one year".into(),
        ));
    }
    let covered = (input.unlevered_fcf.len() - 1) as u32;
    let horizon = input.horizon_years.unwrap_or(covered);
    if horizon > covered {
        return Err(CapitalError::InvalidInput {
            field: "unleveredFcf".into(),
            reason: format!(
                "series covers years 0..={covered} but the horizon is {horizon} years"
            ),
        });
    }
    Ok(horizon)
}

fn coverage_ratio(noi: Option<Money>, debt_service: Money) -> Option<Decimal> {
    if debt_service.is_zero() {
        return None;
    }
    noi.map(|n| n / debt_service)
}

fn loan_to_value(outstanding: Money, investment: Money) -> Option<Decimal> {
    if investment <= Decimal::ZERO {
        None
    } else {
        Some(outstanding / investment)
    }
}

fn flag_covenants(kpis: &[DebtKpi], warnings: &mut Vec<String>) {
    for kpi in kpis {
        if let Some(dscr) = kpi.dscr {
            if dscr < DSCR_COVENANT {
                warnings.push(format!(
                    "Year {} DSCR of {:.2}x is below {DSCR_COVENANT}x: lender covenant risk",
                    kpi.year, dscr
                ));
            }
        }
        if let Some(ltv) = kpi.ltv {
            if ltv > LTV_CEILING {
                warnings.push(format!(
                    "Year {} LTV of {:.1}% exceeds 80%: high leverage",
                    kpi.year,
                    ltv * dec!(100)
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
