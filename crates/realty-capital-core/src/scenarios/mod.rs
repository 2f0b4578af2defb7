pub mod comparison;
pub mod deal;
pub mod operations;
pub mod pipeline;

pub use comparison::{
    compare_scenarios, CaseResult, ComparisonInput, KpiTriad, ScenarioCase, ScenarioComparison,
    DEFAULT_STRESS_FACTOR,
};
pub use deal::{
    BillingPeriod, CapitalStructure, DealScenario, DriverShocks, EquityStructure,
    OperatingAssumptions, RevenueSegment, ValuationAssumptions,
};
pub use operations::{OperatingProjection, RevenueEngine, StabilizedOperations};
pub use pipeline::{evaluate_deal, run_pipeline, wacc, Kpi, KpiSnapshot, PipelineOutput};
