pub mod sampling;
pub mod simulation;
pub mod statistics;
pub mod task;

pub use sampling::{
    cholesky3, Driver, DriverDistribution, DriverVolatility, RandomSource, SamplingPlan,
    SamplingReport, SeededSource,
};
pub use simulation::{
    run_monte_carlo, run_simulation, run_simulation_with_source, CancellationToken,
    IterationOutcome, SimulationConfig, SimulationHooks, SimulationInput, SimulationResult,
};
pub use statistics::{percentile_sorted, summarize, KpiStatistics};
pub use task::{SimulationDriver, SimulationRequest, TaskResponse};
