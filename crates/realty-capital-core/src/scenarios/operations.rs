use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CapitalError;
use crate::scenarios::deal::{DealScenario, OperatingAssumptions};
use crate::types::*;
use crate::CapitalResult;

/// Operating output consumed by the capital engine. Every series covers
/// years `0..=horizon`; year 0 is the acquisition year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingProjection {
    pub revenue: Vec<Money>,
    pub noi: Vec<Money>,
    pub unlevered_fcf: Vec<Money>,
    /// Net sale proceeds included in the final year's unlevered FCF
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_value: Option<Money>,
}

/// Produces unlevered cash flow and NOI for a deal. Implementations must be
/// pure: the same scenario always projects the same series.
pub trait RevenueEngine: Send + Sync {
    fn project(&self, scenario: &DealScenario) -> CapitalResult<OperatingProjection>;
}

/// Stabilized-operations projection: segment revenue grows at its own rate
/// from year 1, expenses are a revenue ratio plus a growing fixed amount,
/// and the asset is sold at the horizon on forward NOI.
#[derive(Debug, Clone, Copy, Default)]
pub struct StabilizedOperations;

impl RevenueEngine for StabilizedOperations {
    fn project(&self, scenario: &DealScenario) -> CapitalResult<OperatingProjection> {
        let horizon = scenario.horizon_years;
        if horizon == 0 {
            return Err(CapitalError::InvalidInput {
                field: "horizonYears".into(),
                reason: "horizon must be at least one year".into(),
            });
        }
        let ops = &scenario.operations;
        if let Some(cap) = ops.exit_cap_rate {
            if cap <= Decimal::ZERO {
                return Err(CapitalError::InvalidInput {
                    field: "operations.exitCapRate".into(),
                    reason: format!("exit cap rate must be positive (got {cap})"),
                });
            }
        }

        let years = horizon as usize + 1;
        let mut revenue = vec![Decimal::ZERO; years];
        let mut noi = vec![Decimal::ZERO; years];
        let mut unlevered_fcf = vec![Decimal::ZERO; years];
        unlevered_fcf[0] = -scenario.capital.initial_investment;

        for y in 1..years {
            let (rev, year_noi) = operate(ops, y as u32);
            revenue[y] = rev;
            noi[y] = year_noi;
            unlevered_fcf[y] = year_noi - ops.capex_reserve_pct * rev;
        }

        let exit_value = ops.exit_cap_rate.map(|cap| {
            let (_, forward_noi) = operate(ops, horizon + 1);
            forward_noi / cap * (Decimal::ONE - ops.selling_cost_pct)
        });
        if let Some(value) = exit_value {
            unlevered_fcf[horizon as usize] += value;
        }

        Ok(OperatingProjection {
            revenue,
            noi,
            unlevered_fcf,
            exit_value,
        })
    }
}

/// Revenue and NOI of operating year `year` (1-based).
fn operate(ops: &OperatingAssumptions, year: u32) -> (Money, Money) {
    let revenue: Money = ops
        .segments
        .iter()
        .map(|s| {
            let rate = s.rate * growth(s.rate_growth, year);
            s.units * rate * s.occupancy * s.billing.periods_per_year()
        })
        .sum();
    let expenses = ops.expense_ratio * revenue + ops.fixed_expenses * growth(ops.expense_growth, year);
    (revenue, revenue - expenses)
}

fn growth(rate: Rate, year: u32) -> Decimal {
    (1..year).fold(Decimal::ONE, |acc, _| acc * (Decimal::ONE + rate))
}
