use pretty_assertions::assert_eq;
use realty_capital_core::debt::{AmortizationPolicy, DebtTranche, Seniority};
use realty_capital_core::monte_carlo::{
    run_monte_carlo, run_simulation, run_simulation_with_source, DriverDistribution,
    DriverVolatility, RandomSource, SimulationConfig, SimulationHooks, SimulationInput,
};
use realty_capital_core::scenarios::{
    BillingPeriod, CapitalStructure, DealScenario, Kpi, OperatingAssumptions, RevenueSegment,
    StabilizedOperations, ValuationAssumptions,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn mixed_use() -> DealScenario {
    DealScenario {
        name: "mixed-use".into(),
        horizon_years: 7,
        operations: OperatingAssumptions {
            segments: vec![
                RevenueSegment {
                    name: "hotel".into(),
                    billing: BillingPeriod::Nightly,
                    units: dec!(90),
                    rate: dec!(210),
                    occupancy: dec!(0.74),
                    rate_growth: dec!(0.03),
                },
                RevenueSegment {
                    name: "residential".into(),
                    billing: BillingPeriod::Monthly,
                    units: dec!(60),
                    rate: dec!(2400),
                    occupancy: dec!(0.95),
                    rate_growth: dec!(0.025),
                },
            ],
            expense_ratio: dec!(0.45),
            fixed_expenses: dec!(450000),
            expense_growth: dec!(0.025),
            capex_reserve_pct: dec!(0.04),
            exit_cap_rate: Some(dec!(0.065)),
            selling_cost_pct: dec!(0.02),
        },
        capital: CapitalStructure {
            initial_investment: dec!(32000000),
            tranches: vec![DebtTranche {
                id: "senior".into(),
                seniority: Seniority::Senior,
                principal: Some(dec!(19000000)),
                interest_rate: dec!(0.058),
                term_years: 10,
                amortization: AmortizationPolicy::Mortgage,
                amortization_years: 30,
                interest_only_years: 2,
                start_year: 0,
                refinance_at_year: None,
                refinance_amount_pct: None,
                origination_fee_pct: dec!(0.01),
                exit_fee_pct: Decimal::ZERO,
            }],
            repay_debt_at_exit: true,
        },
        equity: None,
        valuation: ValuationAssumptions {
            discount_rate: dec!(0.085),
            cost_of_equity: Some(dec!(0.14)),
        },
    }
}

fn normal(std_dev: f64) -> DriverVolatility {
    DriverVolatility {
        std_dev,
        distribution: DriverDistribution::Normal,
    }
}

fn input(iterations: usize, sigma: f64) -> SimulationInput {
    SimulationInput {
        scenario: mixed_use(),
        config: SimulationConfig {
            iterations,
            seed: Some(2024),
            occupancy: normal(sigma),
            adr: normal(sigma),
            interest_rate: normal(sigma / 2.0),
            correlation: None,
            workers: None,
        },
    }
}

/// Always draws the same value.
struct Constant(f64);

impl RandomSource for Constant {
    fn standard_normal(&mut self) -> f64 {
        self.0
    }
}

// ===========================================================================
// Degeneracy and ordering
// ===========================================================================

#[test]
fn test_zero_volatility_every_iteration_equals_base() {
    let result = run_simulation(&StabilizedOperations, &input(25, 0.0), SimulationHooks::default()).unwrap();
    assert_eq!(result.iterations.len(), 25);
    for it in &result.iterations {
        assert!(it.shocks.is_identity());
        assert_eq!(it.kpis, result.base_case);
    }
    let npv = result.stat(Kpi::Npv).unwrap();
    assert!((npv.p10 - npv.p90).abs() < 1e-6);
}

#[test]
fn test_percentiles_are_ordered() {
    let result = run_simulation(&StabilizedOperations, &input(300, 0.12), SimulationHooks::default()).unwrap();
    assert!(!result.statistics.is_empty());
    for (kpi, stats) in &result.statistics {
        assert!(stats.p10 <= stats.p50, "{kpi}: p10 > p50");
        assert!(stats.p50 <= stats.p90, "{kpi}: p50 > p90");
        assert!(stats.min <= stats.p10 && stats.p90 <= stats.max);
    }
}

#[test]
fn test_revenue_shock_direction() {
    // Every draw is +1 sigma: occupancy and rate up, debt cost up
    let result = run_simulation_with_source(
        &StabilizedOperations,
        &input(5, 0.1),
        &mut Constant(1.0),
        SimulationHooks::default(),
    )
    .unwrap();
    let base = result.base_case.npv.unwrap();
    for it in &result.iterations {
        assert!((it.shocks.adr - 1.1).abs() < 1e-12);
        assert!(it.kpis.npv.unwrap() > base);
    }
}

#[test]
fn test_occupancy_is_clamped() {
    // A +5 sigma draw at 50% volatility would push occupancy past 100%
    let result = run_simulation_with_source(
        &StabilizedOperations,
        &input(3, 0.5),
        &mut Constant(5.0),
        SimulationHooks::default(),
    )
    .unwrap();
    let full = mixed_use().perturbed(&result.iterations[0].shocks);
    assert!(full.operations.segments.iter().all(|s| s.occupancy == Decimal::ONE));
}

// ===========================================================================
// Reproducibility and sampling
// ===========================================================================

#[test]
fn test_seeded_runs_are_identical() {
    let a = run_simulation(&StabilizedOperations, &input(100, 0.1), SimulationHooks::default()).unwrap();
    let b = run_simulation(&StabilizedOperations, &input(100, 0.1), SimulationHooks::default()).unwrap();
    assert_eq!(a.iterations, b.iterations);
    assert_eq!(a.statistics, b.statistics);
}

#[test]
fn test_different_seeds_differ() {
    let a = run_simulation(&StabilizedOperations, &input(50, 0.1), SimulationHooks::default()).unwrap();
    let mut other = input(50, 0.1);
    other.config.seed = Some(99);
    let b = run_simulation(&StabilizedOperations, &other, SimulationHooks::default()).unwrap();
    assert_ne!(a.iterations, b.iterations);
}

#[test]
fn test_correlation_with_lognormal_falls_back() {
    let mut i = input(20, 0.1);
    i.config.adr.distribution = DriverDistribution::Lognormal;
    i.config.correlation = Some([[1.0, 0.5, 0.0], [0.5, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    let out = run_monte_carlo(&StabilizedOperations, &i, SimulationHooks::default()).unwrap();
    assert!(!out.result.sampling.correlated);
    assert_eq!(out.result.sampling.adr, DriverDistribution::Lognormal);
    assert!(out.warnings.iter().any(|w| w.contains("independently")));
}

#[test]
fn test_valid_correlation_is_applied() {
    let mut i = input(20, 0.1);
    i.config.correlation = Some([[1.0, 0.7, 0.0], [0.7, 1.0, 0.0], [0.0, 0.0, 1.0]]);
    let out = run_monte_carlo(&StabilizedOperations, &i, SimulationHooks::default()).unwrap();
    assert!(out.result.sampling.correlated);
    assert!(out.warnings.iter().all(|w| !w.contains("independently")));
}

#[test]
fn test_config_defaults_from_json() {
    let json = serde_json::json!({ "scenario": mixed_use(), "config": { "seed": 5 } });
    let i: SimulationInput = serde_json::from_value(json).unwrap();
    assert_eq!(i.config.iterations, 1000);
    assert_eq!(i.config.occupancy.std_dev, 0.0);
    assert_eq!(i.config.workers, None);
}
