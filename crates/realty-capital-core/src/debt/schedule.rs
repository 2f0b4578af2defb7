use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::debt::tranche::{AmortizationPolicy, DebtTranche, Seniority};
use crate::time_value::level_payment;
use crate::types::*;
use crate::CapitalResult;

const MONTHS_PER_YEAR: u32 = 12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One period (a year, or a month within a year) of a tranche schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtScheduleEntry {
    pub year: u32,
    /// Month within `year` (1-12); absent on annual entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,
    pub beginning_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub ending_balance: Money,
}

/// Why a balance was repaid outside the natural amortization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepaymentKind {
    /// Balloon of the remaining balance at term end
    Maturity,
    /// Forced repayment of a fraction of the balance at the refinance year
    Refinance,
    /// Payoff of the outstanding balance at the end of the horizon
    ExitSettlement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForcedRepayment {
    pub year: u32,
    pub kind: RepaymentKind,
    pub amount: Money,
}

/// Full schedule for a single tranche.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrancheSchedule {
    pub tranche_id: String,
    pub seniority: Seniority,
    pub start_year: u32,
    pub initial_principal: Money,
    pub annual: Vec<DebtScheduleEntry>,
    pub monthly: Vec<DebtScheduleEntry>,
    pub repayments: Vec<ForcedRepayment>,
    pub total_interest: Money,
    pub total_principal: Money,
}

impl TrancheSchedule {
    /// Balance left after the last scheduled period. Equals the initial
    /// principal when the horizon ends before the first period.
    pub fn final_balance(&self) -> Money {
        self.annual
            .last()
            .map(|e| e.ending_balance)
            .unwrap_or(self.initial_principal)
    }

    /// Balance outstanding at the end of `year`.
    pub fn outstanding_at(&self, year: u32) -> Money {
        if year < self.start_year {
            return Decimal::ZERO;
        }
        if year == self.start_year {
            return self.initial_principal;
        }
        match self.annual.iter().find(|e| e.year == year) {
            Some(entry) => entry.ending_balance,
            None => match self.annual.last() {
                Some(last) if year > last.year => last.ending_balance,
                _ => Decimal::ZERO,
            },
        }
    }

    pub fn entry_for(&self, year: u32) -> Option<&DebtScheduleEntry> {
        self.annual.iter().find(|e| e.year == year)
    }
}

/// Input for the standalone debt-schedule computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebtScheduleInput {
    pub tranche: DebtTranche,
    pub horizon_years: u32,
    /// Repay any balance still outstanding at the end of the horizon
    #[serde(default)]
    pub repay_at_horizon: bool,
}

// ---------------------------------------------------------------------------
// Amortization state
// ---------------------------------------------------------------------------

/// Running amortization state carried month to month.
struct Amortizer {
    policy: AmortizationPolicy,
    monthly_rate: Rate,
    interest_only_months: u32,
    amortization_months: u32,
    months_amortized: u32,
    payment: Option<Money>,
}

impl Amortizer {
    fn new(tranche: &DebtTranche) -> Self {
        let (interest_only_months, amortization_months) = match tranche.amortization {
            AmortizationPolicy::Mortgage => (
                tranche.interest_only_years * MONTHS_PER_YEAR,
                tranche.amortization_years.max(0) as u32 * MONTHS_PER_YEAR,
            ),
            AmortizationPolicy::InterestOnly | AmortizationPolicy::Bullet => (0, 0),
        };
        Self {
            policy: tranche.amortization,
            monthly_rate: tranche.interest_rate / Decimal::from(MONTHS_PER_YEAR),
            interest_only_months,
            amortization_months,
            months_amortized: 0,
            payment: None,
        }
    }

    /// Principal due under the natural schedule for loan month `loan_month`.
    fn scheduled_principal(
        &mut self,
        loan_month: u32,
        opening: Money,
        interest: Money,
    ) -> CapitalResult<Money> {
        match self.policy {
            AmortizationPolicy::InterestOnly | AmortizationPolicy::Bullet => Ok(Decimal::ZERO),
            AmortizationPolicy::Mortgage => {
                if loan_month <= self.interest_only_months {
                    return Ok(Decimal::ZERO);
                }
                let remaining = self.amortization_months.saturating_sub(self.months_amortized);
                if remaining == 0 {
                    return Ok(opening);
                }
                let payment = match self.payment {
                    Some(p) => p,
                    None => {
                        let p = level_payment(opening, self.monthly_rate, remaining)?;
                        self.payment = Some(p);
                        p
                    }
                };
                self.months_amortized += 1;
                if remaining == 1 {
                    // Last amortizing month absorbs rounding
                    Ok(opening)
                } else {
                    Ok((payment - interest).max(Decimal::ZERO).min(opening))
                }
            }
        }
    }

    /// Re-amortize the remaining balance after a partial paydown.
    fn reset_payment(&mut self) {
        self.payment = None;
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build monthly and annual schedules for one tranche over `horizon_years`.
///
/// Periods run from `start_year + 1` to the earlier of maturity and the
/// horizon. The refinance year pays interest only and force-repays
/// `refinanceAmountPct` of the year's beginning balance in its final month;
/// the maturity year balloons whatever balance remains.
pub fn build_tranche_schedule(
    tranche: &DebtTranche,
    horizon_years: u32,
    settle_at_horizon: bool,
) -> CapitalResult<TrancheSchedule> {
    tranche.validate()?;
    let initial_principal = tranche.principal_amount()?;

    let mut amortizer = Amortizer::new(tranche);
    let first_year = tranche.start_year + 1;
    let last_year = tranche.maturity_year().min(horizon_years);

    let mut monthly = Vec::new();
    let mut repayments = Vec::new();
    let mut balance = initial_principal;
    let mut loan_month = 0u32;

    for year in first_year..=last_year {
        if balance.is_zero() {
            break;
        }
        let year_opening = balance;
        let refinancing = tranche.refinance_at_year == Some(year);
        let maturing = year == tranche.maturity_year();
        let settling = settle_at_horizon && year == horizon_years;

        for month in 1..=MONTHS_PER_YEAR {
            loan_month += 1;
            let opening = balance;
            let interest = opening * amortizer.monthly_rate;

            let mut principal = if refinancing {
                Decimal::ZERO
            } else {
                amortizer.scheduled_principal(loan_month, opening, interest)?
            };

            if month == MONTHS_PER_YEAR {
                if refinancing {
                    let amount = (tranche.refinance_fraction() * year_opening).min(opening - principal);
                    principal += amount;
                    repayments.push(ForcedRepayment {
                        year,
                        kind: RepaymentKind::Refinance,
                        amount,
                    });
                    amortizer.reset_payment();
                }
                if maturing || settling {
                    let rest = opening - principal;
                    if rest > Decimal::ZERO {
                        principal = opening;
                        repayments.push(ForcedRepayment {
                            year,
                            kind: if maturing {
                                RepaymentKind::Maturity
                            } else {
                                RepaymentKind::ExitSettlement
                            },
                            amount: rest,
                        });
                    }
                }
            }

            balance = opening - principal;
            monthly.push(DebtScheduleEntry {
                year,
                month: Some(month),
                beginning_balance: opening,
                interest,
                principal,
                ending_balance: balance,
            });

            if balance.is_zero() {
                break;
            }
        }
    }

    let annual = aggregate_annual(&monthly);
    let total_interest = annual.iter().map(|e| e.interest).sum();
    let total_principal = annual.iter().map(|e| e.principal).sum();

    Ok(TrancheSchedule {
        tranche_id: tranche.id.clone(),
        seniority: tranche.seniority,
        start_year: tranche.start_year,
        initial_principal,
        annual,
        monthly,
        repayments,
        total_interest,
        total_principal,
    })
}

/// Annual schedule for a tranche over `horizon_years`.
pub fn schedule(tranche: &DebtTranche, horizon_years: u32) -> CapitalResult<Vec<DebtScheduleEntry>> {
    Ok(build_tranche_schedule(tranche, horizon_years, false)?.annual)
}

/// Monthly schedule for a tranche over `horizon_years`.
pub fn schedule_monthly(
    tranche: &DebtTranche,
    horizon_years: u32,
) -> CapitalResult<Vec<DebtScheduleEntry>> {
    Ok(build_tranche_schedule(tranche, horizon_years, false)?.monthly)
}

/// Roll monthly entries up into one entry per year.
pub fn aggregate_annual(monthly: &[DebtScheduleEntry]) -> Vec<DebtScheduleEntry> {
    let mut annual: Vec<DebtScheduleEntry> = Vec::new();
    for entry in monthly {
        match annual.last_mut() {
            Some(current) if current.year == entry.year => {
                current.interest += entry.interest;
                current.principal += entry.principal;
                current.ending_balance = entry.ending_balance;
            }
            _ => annual.push(DebtScheduleEntry {
                year: entry.year,
                month: None,
                beginning_balance: entry.beginning_balance,
                interest: entry.interest,
                principal: entry.principal,
                ending_balance: entry.ending_balance,
            }),
        }
    }
    annual
}

/// Build a debt schedule for a single tranche, wrapped with metadata.
pub fn build_debt_schedule(
    input: &DebtScheduleInput,
) -> CapitalResult<ComputationOutput<TrancheSchedule>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = build_tranche_schedule(&input.tranche, input.horizon_years, input.repay_at_horizon)?;

    let balance = output.final_balance();
    if balance > Decimal::ZERO {
        warnings.push(format!(
            "Tranche '{}' has {balance} outstanding at the end of the {}-year horizon",
            output.tranche_id, input.horizon_years
        ));
    }
    if input.tranche.start_year >= input.horizon_years {
        warnings.push(format!(
            "Tranche '{}' is drawn in year {} which leaves no debt-service years within the horizon",
            output.tranche_id, input.tranche.start_year
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Debt Schedule (monthly amortization, annual roll-up)",
        &serde_json::json!({
            "tranche": input.tranche.id,
            "principal": output.initial_principal.to_string(),
            "rate": input.tranche.interest_rate.to_string(),
            "term_years": input.tranche.term_years,
            "amortization": input.tranche.amortization,
            "horizon_years": input.horizon_years,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tranche(policy: AmortizationPolicy) -> DebtTranche {
        DebtTranche {
            id: "senior".into(),
            seniority: Seniority::Senior,
            principal: Some(dec!(1000)),
            interest_rate: dec!(0.06),
            term_years: 5,
            amortization: policy,
            amortization_years: 5,
            interest_only_years: 0,
            start_year: 0,
            refinance_at_year: None,
            refinance_amount_pct: None,
            origination_fee_pct: Decimal::ZERO,
            exit_fee_pct: Decimal::ZERO,
        }
    }

    fn reconciles(s: &TrancheSchedule) -> bool {
        let total: Money = s.annual.iter().map(|e| e.principal).sum();
        (total + s.final_balance() - s.initial_principal).abs() <= dec!(0.01)
    }

    #[test]
    fn test_interest_only_balloons_at_term() {
        let s = build_tranche_schedule(&tranche(AmortizationPolicy::InterestOnly), 10, false).unwrap();
        assert_eq!(s.annual.len(), 5);
        for e in &s.annual[..4] {
            assert_eq!(e.principal, Decimal::ZERO);
            assert_eq!(e.interest, dec!(60));
        }
        assert_eq!(s.annual[4].principal, dec!(1000));
        assert_eq!(s.annual[4].ending_balance, Decimal::ZERO);
        assert_eq!(s.repayments.len(), 1);
        assert_eq!(s.repayments[0].kind, RepaymentKind::Maturity);
        assert!(reconciles(&s));
    }

    #[test]
    fn test_bullet_matches_interest_only() {
        let io = build_tranche_schedule(&tranche(AmortizationPolicy::InterestOnly), 10, false).unwrap();
        let bullet = build_tranche_schedule(&tranche(AmortizationPolicy::Bullet), 10, false).unwrap();
        assert_eq!(io.annual, bullet.annual);
    }

    #[test]
    fn test_mortgage_fully_amortizes() {
        let s = build_tranche_schedule(&tranche(AmortizationPolicy::Mortgage), 10, false).unwrap();
        assert_eq!(s.monthly.len(), 60);
        assert_eq!(s.final_balance(), Decimal::ZERO);
        // Level payments: principal grows each year
        assert!(s.annual[1].principal > s.annual[0].principal);
        // No balloon when amortization equals term
        let maturity_balloon: Money = s.repayments.iter().map(|r| r.amount).sum();
        assert!(maturity_balloon < dec!(0.01));
        assert!(reconciles(&s));
    }

    #[test]
    fn test_mortgage_balloon_when_amortization_exceeds_term() {
        let mut t = tranche(AmortizationPolicy::Mortgage);
        t.amortization_years = 30;
        let s = build_tranche_schedule(&t, 10, false).unwrap();
        let last_month = s.monthly.last().unwrap();
        assert_eq!(last_month.principal, last_month.beginning_balance);
        assert_eq!(last_month.ending_balance, Decimal::ZERO);
        assert!(s.repayments[0].amount > dec!(800));
        assert!(reconciles(&s));
    }

    #[test]
    fn test_interest_only_period_then_amortization() {
        let mut t = tranche(AmortizationPolicy::Mortgage);
        t.interest_only_years = 2;
        t.amortization_years = 3;
        let s = build_tranche_schedule(&t, 10, false).unwrap();
        assert_eq!(s.annual[0].principal, Decimal::ZERO);
        assert_eq!(s.annual[1].principal, Decimal::ZERO);
        assert!(s.annual[2].principal > Decimal::ZERO);
        assert_eq!(s.final_balance(), Decimal::ZERO);
    }

    #[test]
    fn test_partial_refinance_reduces_balance() {
        let mut t = tranche(AmortizationPolicy::InterestOnly);
        t.refinance_at_year = Some(2);
        t.refinance_amount_pct = Some(dec!(0.25));
        let s = build_tranche_schedule(&t, 10, false).unwrap();
        let year2 = s.entry_for(2).unwrap();
        assert_eq!(year2.principal, dec!(250));
        assert_eq!(year2.ending_balance, dec!(750));
        assert_eq!(s.entry_for(3).unwrap().interest, dec!(45));
        assert!(reconciles(&s));
    }

    #[test]
    fn test_mortgage_reamortizes_after_partial_refinance() {
        let mut t = tranche(AmortizationPolicy::Mortgage);
        t.refinance_at_year = Some(2);
        t.refinance_amount_pct = Some(dec!(0.5));
        let s = build_tranche_schedule(&t, 10, false).unwrap();
        let year2 = s.entry_for(2).unwrap();
        assert_eq!(year2.principal, year2.beginning_balance * dec!(0.5));
        assert_eq!(s.final_balance(), Decimal::ZERO);
        assert!(reconciles(&s));
    }

    #[test]
    fn test_horizon_truncation_and_settlement() {
        let t = tranche(AmortizationPolicy::InterestOnly);
        let open = build_tranche_schedule(&t, 3, false).unwrap();
        assert_eq!(open.annual.len(), 3);
        assert_eq!(open.final_balance(), dec!(1000));
        assert!(reconciles(&open));

        let settled = build_tranche_schedule(&t, 3, true).unwrap();
        assert_eq!(settled.final_balance(), Decimal::ZERO);
        assert_eq!(settled.repayments[0].kind, RepaymentKind::ExitSettlement);
    }

    #[test]
    fn test_deferred_start_year() {
        let mut t = tranche(AmortizationPolicy::InterestOnly);
        t.start_year = 2;
        let s = build_tranche_schedule(&t, 10, false).unwrap();
        assert_eq!(s.annual.first().unwrap().year, 3);
        assert_eq!(s.annual.last().unwrap().year, 7);
        assert_eq!(s.outstanding_at(1), Decimal::ZERO);
        assert_eq!(s.outstanding_at(2), dec!(1000));
        assert_eq!(s.outstanding_at(8), Decimal::ZERO);
    }

    #[test]
    fn test_monthly_rolls_up_to_annual() {
        let s = build_tranche_schedule(&tranche(AmortizationPolicy::Mortgage), 10, false).unwrap();
        for year in &s.annual {
            let months: Vec<_> = s.monthly.iter().filter(|m| m.year == year.year).collect();
            let interest: Money = months.iter().map(|m| m.interest).sum();
            let principal: Money = months.iter().map(|m| m.principal).sum();
            assert!((interest - year.interest).abs() < dec!(0.0001));
            assert!((principal - year.principal).abs() < dec!(0.0001));
        }
    }

    #[test]
    fn test_envelope_warns_on_outstanding_balance() {
        let input = DebtScheduleInput {
            tranche: tranche(AmortizationPolicy::Bullet),
            horizon_years: 2,
            repay_at_horizon: false,
        };
        let out = build_debt_schedule(&input).unwrap();
        assert_eq!(out.result.annual.len(), 2);
        assert!(out.warnings.iter().any(|w| w.contains("outstanding")));
    }
}
