use pretty_assertions::assert_eq;
use proptest::prelude::*;
use realty_capital_core::debt::{
    build_debt_schedule, build_tranche_schedule, schedule, schedule_monthly, AmortizationPolicy,
    DebtScheduleInput, DebtTranche, RepaymentKind, Seniority,
};
use realty_capital_core::CapitalError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn tranche(policy: AmortizationPolicy, principal: Decimal, rate: Decimal) -> DebtTranche {
    DebtTranche {
        id: "senior".into(),
        seniority: Seniority::Senior,
        principal: Some(principal),
        interest_rate: rate,
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

fn reconciles(t: &DebtTranche, horizon: u32) {
    let s = build_tranche_schedule(t, horizon, false).unwrap();
    let repaid: Decimal = s.annual.iter().map(|e| e.principal).sum();
    assert_eq!(repaid + s.final_balance(), s.initial_principal);
    for pair in s.annual.windows(2) {
        assert_eq!(pair[0].ending_balance, pair[1].beginning_balance);
    }
}

// ===========================================================================
// Principal reconciliation
// ===========================================================================

#[test]
fn test_reconciliation_interest_only() {
    reconciles(&tranche(AmortizationPolicy::InterestOnly, dec!(1000000), dec!(0.06)), 5);
}

#[test]
fn test_reconciliation_mortgage() {
    reconciles(&tranche(AmortizationPolicy::Mortgage, dec!(1000000), dec!(0.06)), 5);
}

#[test]
fn test_reconciliation_bullet() {
    reconciles(&tranche(AmortizationPolicy::Bullet, dec!(1000000), dec!(0.06)), 5);
}

#[test]
fn test_reconciliation_balloon() {
    let mut t = tranche(AmortizationPolicy::Mortgage, dec!(1000000), dec!(0.06));
    t.amortization_years = 25;
    reconciles(&t, 5);
    let s = build_tranche_schedule(&t, 5, false).unwrap();
    assert_eq!(s.repayments.len(), 1);
    assert_eq!(s.repayments[0].kind, RepaymentKind::Maturity);
    assert!(s.repayments[0].amount > dec!(800000));
}

#[test]
fn test_reconciliation_truncated_horizon() {
    reconciles(&tranche(AmortizationPolicy::Mortgage, dec!(500000), dec!(0.05)), 3);
}

// ===========================================================================
// Refinance
// ===========================================================================

#[test]
fn test_refinance_zeroes_balance_in_year() {
    let mut t = tranche(AmortizationPolicy::Mortgage, dec!(1000000), dec!(0.06));
    t.amortization_years = 30;
    t.refinance_at_year = Some(3);
    let entries = schedule(&t, 5).unwrap();
    let y3 = entries.iter().find(|e| e.year == 3).unwrap();
    assert_eq!(y3.ending_balance, Decimal::ZERO);
    assert!(entries.iter().all(|e| e.year <= 3));
}

#[test]
fn test_refinance_at_final_horizon_year() {
    let mut t = tranche(AmortizationPolicy::InterestOnly, dec!(750000), dec!(0.05));
    t.term_years = 7;
    t.refinance_at_year = Some(4);
    let entries = schedule(&t, 4).unwrap();
    let last = entries.last().unwrap();
    assert_eq!(last.year, 4);
    assert_eq!(last.ending_balance, Decimal::ZERO);
    assert_eq!(last.principal, dec!(750000));
}

#[test]
fn test_refinance_year_is_interest_only_until_payoff() {
    let mut t = tranche(AmortizationPolicy::Mortgage, dec!(120000), dec!(0.06));
    t.refinance_at_year = Some(2);
    let monthly = schedule_monthly(&t, 5).unwrap();
    let year_two: Vec<_> = monthly.iter().filter(|e| e.year == 2).collect();
    assert_eq!(year_two.len(), 12);
    assert!(year_two[..11].iter().all(|e| e.principal.is_zero()));
    assert_eq!(year_two[11].ending_balance, Decimal::ZERO);
}

// ===========================================================================
// Edge cases
// ===========================================================================

#[test]
fn test_zero_rate_mortgage_amortizes_evenly() {
    let mut t = tranche(AmortizationPolicy::Mortgage, dec!(12000), Decimal::ZERO);
    t.term_years = 1;
    t.amortization_years = 1;
    let monthly = schedule_monthly(&t, 1).unwrap();
    assert_eq!(monthly.len(), 12);
    let total: Decimal = monthly.iter().map(|e| e.principal).sum();
    assert!((total - dec!(12000)).abs() < dec!(0.0001));
    assert!(monthly.last().unwrap().ending_balance.abs() < dec!(0.0001));
    assert!(monthly.iter().all(|e| e.interest.is_zero()));
}

#[test]
fn test_zero_amortization_years_is_configuration_error() {
    let mut t = tranche(AmortizationPolicy::Mortgage, dec!(12000), dec!(0.05));
    t.amortization_years = 0;
    let err = schedule(&t, 5).unwrap_err();
    assert!(err.is_configuration());
    assert!(err.to_string().contains("amortizationYears must be > 0"));
}

#[test]
fn test_missing_principal_names_tranche() {
    let mut t = tranche(AmortizationPolicy::Bullet, dec!(1), dec!(0.05));
    t.principal = None;
    match schedule(&t, 5).unwrap_err() {
        CapitalError::Configuration { field, .. } => assert!(field.contains("senior")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_envelope_reports_outstanding_balance() {
    let input = DebtScheduleInput {
        tranche: tranche(AmortizationPolicy::Bullet, dec!(400000), dec!(0.07)),
        horizon_years: 3,
        repay_at_horizon: false,
    };
    let out = build_debt_schedule(&input).unwrap();
    assert_eq!(out.result.final_balance(), dec!(400000));
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.metadata.precision, "rust_decimal_128bit");
}

#[test]
fn test_settlement_at_horizon_records_repayment() {
    let input = DebtScheduleInput {
        tranche: tranche(AmortizationPolicy::Bullet, dec!(400000), dec!(0.07)),
        horizon_years: 3,
        repay_at_horizon: true,
    };
    let out = build_debt_schedule(&input).unwrap();
    assert_eq!(out.result.final_balance(), Decimal::ZERO);
    assert_eq!(out.result.repayments[0].kind, RepaymentKind::ExitSettlement);
    assert!(out.warnings.is_empty());
}

// ===========================================================================
// Property tests
// ===========================================================================

fn policy() -> impl Strategy<Value = AmortizationPolicy> {
    prop_oneof![
        Just(AmortizationPolicy::InterestOnly),
        Just(AmortizationPolicy::Mortgage),
        Just(AmortizationPolicy::Bullet),
    ]
}

proptest! {
    #[test]
    fn prop_principal_reconciles(
        policy in policy(),
        principal in 1_000u64..50_000_000,
        rate_bps in 0u32..1500,
        term in 1u32..15,
        amort in 1i32..35,
        horizon in 1u32..20,
    ) {
        let mut t = tranche(policy, Decimal::from(principal), Decimal::new(rate_bps as i64, 4));
        t.term_years = term;
        t.amortization_years = amort;
        let s = build_tranche_schedule(&t, horizon, false).unwrap();
        let repaid: Decimal = s.annual.iter().map(|e| e.principal).sum();
        prop_assert_eq!(repaid + s.final_balance(), s.initial_principal);
        prop_assert!(s.final_balance() >= Decimal::ZERO);
        if horizon >= term {
            prop_assert_eq!(s.final_balance(), Decimal::ZERO);
        }
    }
}
