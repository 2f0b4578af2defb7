use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::debt::tranche::DebtTranche;
use crate::types::*;
use crate::waterfall::config::{EquityClass, WaterfallTier};

// ---------------------------------------------------------------------------
// Deal scenario
// ---------------------------------------------------------------------------

/// How often a segment's rate is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Hospitality: rate is an average daily rate
    Nightly,
    /// Residential and most commercial leases
    Monthly,
    Annual,
}

impl BillingPeriod {
    pub fn periods_per_year(self) -> Decimal {
        match self {
            BillingPeriod::Nightly => Decimal::from(365),
            BillingPeriod::Monthly => Decimal::from(12),
            BillingPeriod::Annual => Decimal::ONE,
        }
    }
}

/// One revenue-producing use within the development (hotel keys,
/// apartments, retail units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueSegment {
    pub name: String,
    pub billing: BillingPeriod,
    pub units: Decimal,
    /// Rate per unit per billing period (ADR for nightly segments)
    pub rate: Money,
    /// Stabilized occupancy in [0, 1]
    pub occupancy: Rate,
    #[serde(default)]
    pub rate_growth: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingAssumptions {
    pub segments: Vec<RevenueSegment>,
    /// Variable operating expenses as a share of revenue
    #[serde(default)]
    pub expense_ratio: Rate,
    /// Fixed operating expenses in year 1
    #[serde(default)]
    pub fixed_expenses: Money,
    #[serde(default)]
    pub expense_growth: Rate,
    /// Capital reserve as a share of revenue, deducted below NOI
    #[serde(default)]
    pub capex_reserve_pct: Rate,
    /// Cap rate applied to forward NOI for the exit value. No sale when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_cap_rate: Option<Rate>,
    #[serde(default)]
    pub selling_cost_pct: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapitalStructure {
    /// Total project cost funded in year 0
    pub initial_investment: Money,
    #[serde(default)]
    pub tranches: Vec<DebtTranche>,
    #[serde(default = "default_true")]
    pub repay_debt_at_exit: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityStructure {
    pub equity_classes: Vec<EquityClass>,
    #[serde(default)]
    pub tiers: Vec<WaterfallTier>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuationAssumptions {
    /// Rate used to discount unlevered cash flow for NPV
    pub discount_rate: Rate,
    /// Cost of equity for WACC; defaults to the discount rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_of_equity: Option<Rate>,
}

/// Complete, immutable description of one deal case. Every engine run
/// works from its own clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealScenario {
    pub name: String,
    pub horizon_years: u32,
    pub operations: OperatingAssumptions,
    pub capital: CapitalStructure,
    /// Absent for a deal with a single owner
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equity: Option<EquityStructure>,
    pub valuation: ValuationAssumptions,
}

// ---------------------------------------------------------------------------
// Driver shocks
// ---------------------------------------------------------------------------

/// Multipliers applied uniformly to the revenue and debt drivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverShocks {
    pub occupancy: f64,
    pub adr: f64,
    pub interest_rate: f64,
}

impl Default for DriverShocks {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl DriverShocks {
    pub const IDENTITY: DriverShocks = DriverShocks {
        occupancy: 1.0,
        adr: 1.0,
        interest_rate: 1.0,
    };

    /// All revenue drivers moved by the same factor, debt untouched.
    pub fn revenue(multiplier: f64) -> Self {
        Self {
            occupancy: multiplier,
            adr: multiplier,
            interest_rate: 1.0,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl DealScenario {
    /// A perturbed copy: occupancy of every segment scaled and clamped to
    /// [0, 1], every segment rate scaled, every tranche rate scaled. The
    /// receiver is never modified.
    pub fn perturbed(&self, shocks: &DriverShocks) -> DealScenario {
        let mut scenario = self.clone();
        if shocks.is_identity() {
            return scenario;
        }
        for segment in &mut scenario.operations.segments {
            segment.occupancy = scale(segment.occupancy, shocks.occupancy)
                .clamp(Decimal::ZERO, Decimal::ONE);
            segment.rate = scale(segment.rate, shocks.adr).max(Decimal::ZERO);
        }
        for tranche in &mut scenario.capital.tranches {
            tranche.interest_rate = scale(tranche.interest_rate, shocks.interest_rate).max(Decimal::ZERO);
        }
        scenario
    }

    pub fn total_debt(&self) -> Money {
        self.capital
            .tranches
            .iter()
            .filter_map(|t| t.principal)
            .sum()
    }
}

/// Scale a Decimal by an f64 multiplier. A multiplier of exactly 1 leaves
/// the value bit-for-bit unchanged; non-finite multipliers fall back to 1.
fn scale(value: Decimal, multiplier: f64) -> Decimal {
    if multiplier == 1.0 {
        return value;
    }
    match Decimal::from_f64(multiplier) {
        Some(m) => value * m,
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn scenario() -> DealScenario {
        DealScenario {
            name: "base".into(),
            horizon_years: 5,
            operations: OperatingAssumptions {
                segments: vec![RevenueSegment {
                    name: "hotel".into(),
                    billing: BillingPeriod::Nightly,
                    units: dec!(100),
                    rate: dec!(200),
                    occupancy: dec!(0.7),
                    rate_growth: dec!(0.03),
                }],
                expense_ratio: dec!(0.4),
                fixed_expenses: dec!(500000),
                expense_growth: dec!(0.02),
                capex_reserve_pct: dec!(0.04),
                exit_cap_rate: Some(dec!(0.07)),
                selling_cost_pct: dec!(0.02),
            },
            capital: CapitalStructure {
                initial_investment: dec!(30000000),
                tranches: vec![],
                repay_debt_at_exit: true,
            },
            equity: None,
            valuation: ValuationAssumptions {
                discount_rate: dec!(0.09),
                cost_of_equity: None,
            },
        }
    }

    #[test]
    fn test_identity_shock_is_unchanged_clone() {
        let base = scenario();
        assert_eq!(base.perturbed(&DriverShocks::IDENTITY), base);
    }

    #[test]
    fn test_occupancy_clamped() {
        let shocked = scenario().perturbed(&DriverShocks {
            occupancy: 2.0,
            adr: 1.0,
            interest_rate: 1.0,
        });
        assert_eq!(shocked.operations.segments[0].occupancy, Decimal::ONE);
        assert_eq!(shocked.operations.segments[0].rate, dec!(200));
    }

    #[test]
    fn test_negative_multiplier_floors_rate() {
        let shocked = scenario().perturbed(&DriverShocks {
            occupancy: 1.0,
            adr: -0.5,
            interest_rate: 1.0,
        });
        assert_eq!(shocked.operations.segments[0].rate, Decimal::ZERO);
    }

    #[test]
    fn test_revenue_shock() {
        let shocked = scenario().perturbed(&DriverShocks::revenue(0.9));
        assert_eq!(shocked.operations.segments[0].rate, dec!(180));
        assert_eq!(shocked.operations.segments[0].occupancy, dec!(0.63));
    }
}
