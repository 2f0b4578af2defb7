use pretty_assertions::assert_eq;
use realty_capital_core::capital::{compute_capital_structure, run_capital_engine, CapitalInput};
use realty_capital_core::debt::{AmortizationPolicy, DebtTranche, Seniority};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn mortgage(id: &str, principal: Decimal, rate: Decimal, years: u32) -> DebtTranche {
    DebtTranche {
        id: id.into(),
        seniority: Seniority::Senior,
        principal: Some(principal),
        interest_rate: rate,
        term_years: years,
        amortization: AmortizationPolicy::Mortgage,
        amortization_years: years as i32,
        interest_only_years: 0,
        start_year: 0,
        refinance_at_year: None,
        refinance_amount_pct: None,
        origination_fee_pct: Decimal::ZERO,
        exit_fee_pct: Decimal::ZERO,
    }
}

fn flat_input(tranches: Vec<DebtTranche>) -> CapitalInput {
    CapitalInput {
        unlevered_fcf: vec![dec!(-50000), dec!(14000), dec!(14000), dec!(14000)],
        noi: vec![Decimal::ZERO, dec!(14000), dec!(14000), dec!(14000)],
        tranches,
        horizon_years: Some(3),
        initial_investment: dec!(50000),
        repay_debt_at_exit: true,
        include_monthly: false,
    }
}

// ===========================================================================
// Debt-service identity
// ===========================================================================

#[test]
fn test_debt_service_identity_three_year_mortgage() {
    let input = flat_input(vec![mortgage("senior", dec!(30000), dec!(0.04), 3)]);
    let mut warnings = Vec::new();
    let out = compute_capital_structure(&input, &mut warnings).unwrap();

    for e in &out.levered_fcf {
        assert_eq!(e.total_debt_service, e.interest + e.principal);
        assert_eq!(
            e.levered_fcf,
            e.unlevered_fcf - e.interest - e.principal - e.transaction_costs
        );
    }

    let principal: Decimal = out.levered_fcf.iter().map(|e| e.principal).sum();
    assert_eq!(principal, dec!(30000));

    // Level monthly payment of ~885.76 over 36 months
    let service: Decimal = out.levered_fcf.iter().map(|e| e.total_debt_service).sum();
    assert!((service - dec!(31887.4)).abs() < dec!(5), "debt service {service}");
    let y1 = &out.levered_fcf[1];
    assert!((y1.levered_fcf - dec!(3371)).abs() < dec!(5), "levered {}", y1.levered_fcf);
    assert_eq!(out.levered_fcf[3].outstanding_debt, Decimal::ZERO);
}

#[test]
fn test_year_zero_carries_proceeds_not_service() {
    let input = flat_input(vec![mortgage("senior", dec!(30000), dec!(0.04), 3)]);
    let mut warnings = Vec::new();
    let out = compute_capital_structure(&input, &mut warnings).unwrap();
    let y0 = &out.levered_fcf[0];
    assert_eq!(y0.total_debt_service, Decimal::ZERO);
    assert_eq!(y0.debt_proceeds, dec!(30000));
    assert_eq!(y0.equity_cash_flow, dec!(-20000));
    assert_eq!(out.debt_kpis[0].ltv, Some(dec!(0.6)));
}

// ===========================================================================
// Multi-tranche stacks
// ===========================================================================

#[test]
fn test_senior_and_mezz_coverage() {
    let senior = mortgage("senior", dec!(25000), dec!(0.04), 3);
    let mut mezz = mortgage("mezz", dec!(10000), dec!(0.10), 3);
    mezz.seniority = Seniority::Mezz;
    mezz.amortization = AmortizationPolicy::InterestOnly;
    mezz.amortization_years = 0;

    let mut warnings = Vec::new();
    let out = compute_capital_structure(&flat_input(vec![senior, mezz]), &mut warnings).unwrap();
    assert_eq!(out.tranches.len(), 2);
    assert_eq!(out.total_debt, dec!(35000));

    let y1 = &out.debt_kpis[1];
    let dscr = y1.dscr.unwrap();
    let senior_dscr = y1.senior_dscr.unwrap();
    assert!(senior_dscr > dscr);
    assert!((out.tranches[1].coverage[0].debt_service - dec!(1000)).abs() < dec!(0.0001));
    assert_eq!(out.max_ltv, Some(dec!(0.7)));
}

#[test]
fn test_fees_flow_through_transaction_costs() {
    let mut t = mortgage("senior", dec!(30000), dec!(0.04), 5);
    t.origination_fee_pct = dec!(0.01);
    t.exit_fee_pct = dec!(0.02);
    let mut warnings = Vec::new();
    let out = compute_capital_structure(&flat_input(vec![t]), &mut warnings).unwrap();

    assert_eq!(out.levered_fcf[0].transaction_costs, dec!(300));
    let settled = out.tranches[0].repayments[0].amount;
    assert_eq!(out.levered_fcf[3].transaction_costs, dec!(0.02) * settled);
    assert_eq!(out.tranches[0].exit_fees, dec!(0.02) * settled);
}

#[test]
fn test_envelope_warns_below_covenant() {
    let input = flat_input(vec![mortgage("senior", dec!(45000), dec!(0.08), 3)]);
    let out = run_capital_engine(&input).unwrap();
    assert!(out.warnings.iter().any(|w| w.contains("DSCR")));
    assert!(out.warnings.iter().any(|w| w.contains("LTV")));
    assert!(out.result.min_dscr.unwrap() < dec!(1.2));
}

#[test]
fn test_configuration_error_aborts_before_any_year() {
    let mut bad = mortgage("senior", dec!(30000), dec!(0.04), 3);
    bad.amortization_years = -1;
    let mut warnings = Vec::new();
    let err = compute_capital_structure(&flat_input(vec![bad]), &mut warnings).unwrap_err();
    assert!(err.is_configuration());
    assert!(warnings.is_empty());
}

#[test]
fn test_monthly_schedule_on_request() {
    let mut input = flat_input(vec![mortgage("senior", dec!(30000), dec!(0.04), 3)]);
    input.include_monthly = true;
    let mut warnings = Vec::new();
    let out = compute_capital_structure(&input, &mut warnings).unwrap();
    assert_eq!(out.tranches[0].monthly_schedule.as_ref().map(Vec::len), Some(36));
}
