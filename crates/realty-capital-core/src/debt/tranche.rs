use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CapitalError;
use crate::types::*;
use crate::CapitalResult;

/// Seniority class of a tranche within the capital stack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Seniority {
    #[default]
    Senior,
    Mezz,
    Bridge,
    Other,
}

/// How scheduled principal is repaid over the life of a tranche.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmortizationPolicy {
    /// Interest only, full balance repaid as a balloon at term end
    InterestOnly,
    /// Level-payment amortization over `amortization_years`
    Mortgage,
    /// Interest only throughout, principal repaid in full at term end
    Bullet,
}

/// Input for a single debt tranche.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtTranche {
    pub id: String,
    #[serde(default)]
    pub seniority: Seniority,
    /// Initial principal drawn at `start_year`
    #[serde(default)]
    pub principal: Option<Money>,
    /// Annual nominal interest rate
    pub interest_rate: Rate,
    pub term_years: u32,
    pub amortization: AmortizationPolicy,
    /// Amortization period in years. May exceed the term, in which case the
    /// tranche balloons at term end.
    #[serde(default)]
    pub amortization_years: i32,
    /// Interest-only years before amortization starts (mortgage only)
    #[serde(default)]
    pub interest_only_years: u32,
    /// Year of drawdown; the first debt-service year is `start_year + 1`
    #[serde(default)]
    pub start_year: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinance_at_year: Option<u32>,
    /// Fraction of the outstanding balance repaid at refinance (default 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinance_amount_pct: Option<Rate>,
    #[serde(default)]
    pub origination_fee_pct: Rate,
    #[serde(default)]
    pub exit_fee_pct: Rate,
}

impl DebtTranche {
    /// Validated principal. Fails when the field is missing or not positive.
    pub fn principal_amount(&self) -> CapitalResult<Money> {
        match self.principal {
            None => Err(CapitalError::config(
                self.field("principal"),
                "principal is required",
            )),
            Some(p) if p <= Decimal::ZERO => Err(CapitalError::config(
                self.field("principal"),
                format!("principal must be > 0 (got {p})"),
            )),
            Some(p) => Ok(p),
        }
    }

    /// Year in which the term ends and any balance balloons.
    pub fn maturity_year(&self) -> u32 {
        self.start_year + self.term_years
    }

    pub fn refinance_fraction(&self) -> Rate {
        self.refinance_amount_pct.unwrap_or(Decimal::ONE)
    }

    /// Reject configurations that cannot be scheduled. Runs before any
    /// period is computed.
    pub fn validate(&self) -> CapitalResult<()> {
        self.principal_amount()?;

        if self.term_years == 0 {
            return Err(CapitalError::config(
                self.field("termYears"),
                "termYears must be >= 1",
            ));
        }
        if self.interest_rate < Decimal::ZERO {
            return Err(CapitalError::config(
                self.field("interestRate"),
                format!("interestRate must be >= 0 (got {})", self.interest_rate),
            ));
        }

        match self.amortization {
            AmortizationPolicy::Mortgage => {
                if self.amortization_years <= 0 {
                    return Err(CapitalError::config(
                        self.field("amortizationYears"),
                        format!(
                            "amortizationYears must be > 0 for mortgage amortization (got {})",
                            self.amortization_years
                        ),
                    ));
                }
                if self.interest_only_years >= self.term_years {
                    return Err(CapitalError::config(
                        self.field("interestOnlyYears"),
                        "interestOnlyYears must be shorter than termYears for a mortgage; use interest_only instead",
                    ));
                }
            }
            AmortizationPolicy::InterestOnly | AmortizationPolicy::Bullet => {}
        }

        if let Some(year) = self.refinance_at_year {
            if year <= self.start_year || year > self.maturity_year() {
                return Err(CapitalError::config(
                    self.field("refinanceAtYear"),
                    format!(
                        "refinanceAtYear must fall within the term ({}..={}), got {year}",
                        self.start_year + 1,
                        self.maturity_year()
                    ),
                ));
            }
        }
        if let Some(pct) = self.refinance_amount_pct {
            if pct <= Decimal::ZERO || pct > Decimal::ONE {
                return Err(CapitalError::config(
                    self.field("refinanceAmountPct"),
                    format!("refinanceAmountPct must be in (0, 1] (got {pct})"),
                ));
            }
        }

        for (name, pct) in [
            ("originationFeePct", self.origination_fee_pct),
            ("exitFeePct", self.exit_fee_pct),
        ] {
            if pct < Decimal::ZERO {
                return Err(CapitalError::config(
                    self.field(name),
                    format!("{name} must be >= 0 (got {pct})"),
                ));
            }
        }

        Ok(())
    }

    fn field(&self, name: &str) -> String {
        format!("tranche '{}'.{name}", self.id)
    }
}
