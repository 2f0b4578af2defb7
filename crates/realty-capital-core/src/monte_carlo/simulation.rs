use crossbeam::channel::{self, Receiver};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::CapitalError;
use crate::monte_carlo::sampling::{
    DriverVolatility, RandomSource, SamplingPlan, SamplingReport, SeededSource,
};
use crate::monte_carlo::statistics::{summarize, KpiStatistics};
use crate::scenarios::deal::{DealScenario, DriverShocks};
use crate::scenarios::operations::RevenueEngine;
use crate::scenarios::pipeline::{run_pipeline, Kpi, KpiSnapshot};
use crate::types::{with_metadata_f64, ComputationOutput};
use crate::CapitalResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_iterations() -> usize {
    1_000
}

/// Simulation settings. Volatilities default to zero, which reproduces the
/// base case in every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationConfig {
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Seed for reproducible runs; entropy-seeded when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub occupancy: DriverVolatility,
    #[serde(default)]
    pub adr: DriverVolatility,
    #[serde(default)]
    pub interest_rate: DriverVolatility,
    /// Correlation of (occupancy, adr, interestRate)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation: Option<[[f64; 3]; 3]>,
    /// Worker threads; all cores when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            seed: None,
            occupancy: DriverVolatility::default(),
            adr: DriverVolatility::default(),
            interest_rate: DriverVolatility::default(),
            correlation: None,
            workers: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationInput {
    pub scenario: DealScenario,
    #[serde(default)]
    pub config: SimulationConfig,
}

/// KPI snapshot of one iteration and the shocks that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IterationOutcome {
    pub index: usize,
    pub shocks: DriverShocks,
    pub kpis: KpiSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub config: SimulationConfig,
    pub base_case: KpiSnapshot,
    pub iterations: Vec<IterationOutcome>,
    /// KPIs with at least one finite value
    pub statistics: BTreeMap<Kpi, KpiStatistics>,
    pub sampling: SamplingReport,
    pub completed_iterations: usize,
    pub cancelled: bool,
    pub warnings: Vec<String>,
}

impl SimulationResult {
    pub fn stat(&self, kpi: Kpi) -> Option<&KpiStatistics> {
        self.statistics.get(&kpi)
    }
}

/// Cooperative cancellation flag shared with a running simulation.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Optional observers of a run. Progress is a percentage in 0..=100 and
/// reaches 100 exactly once, only when every iteration succeeded.
#[derive(Clone, Copy, Default)]
pub struct SimulationHooks<'a> {
    pub on_progress: Option<&'a (dyn Fn(u8) + Sync)>,
    pub cancel: Option<&'a CancellationToken>,
}

enum ProgressEvent {
    Completed,
    Finished { success: bool },
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run a simulation and wrap it with metadata.
pub fn run_monte_carlo(
    engine: &dyn RevenueEngine,
    input: &SimulationInput,
    hooks: SimulationHooks<'_>,
) -> CapitalResult<ComputationOutput<SimulationResult>> {
    let start = Instant::now();
    let result = run_simulation(engine, input, hooks)?;

    let elapsed = start.elapsed().as_micros() as u64;
    let warnings = result.warnings.clone();
    Ok(with_metadata_f64(
        "Monte Carlo Deal Simulation (driver multipliers, full pipeline per iteration)",
        &serde_json::json!({
            "scenario": input.scenario.name,
            "iterations": input.config.iterations,
            "seed": input.config.seed,
            "correlated": result.sampling.correlated,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Run a simulation with the default `StdRng` source, seeded from the
/// config when a seed is given.
pub fn run_simulation(
    engine: &dyn RevenueEngine,
    input: &SimulationInput,
    hooks: SimulationHooks<'_>,
) -> CapitalResult<SimulationResult> {
    let mut source = SeededSource::new(input.config.seed)?;
    run_simulation_with_source(engine, input, &mut source, hooks)
}

/// Run a simulation drawing from `source`. Shocks are sampled up front in
/// iteration order, so results do not depend on the worker count.
pub fn run_simulation_with_source(
    engine: &dyn RevenueEngine,
    input: &SimulationInput,
    source: &mut dyn RandomSource,
    hooks: SimulationHooks<'_>,
) -> CapitalResult<SimulationResult> {
    let config = &input.config;
    validate_config(config)?;

    let mut warnings: Vec<String> = Vec::new();
    let plan = SamplingPlan::new(
        [config.occupancy, config.adr, config.interest_rate],
        config.correlation.as_ref(),
        &mut warnings,
    )?;

    let mut base_warnings = Vec::new();
    let base = run_pipeline(engine, &input.scenario, &mut base_warnings)?;
    warnings.extend(base_warnings.into_iter().map(|w| format!("base case: {w}")));

    let shocks: Vec<DriverShocks> = (0..config.iterations).map(|_| plan.draw(source)).collect();

    tracing::info!(
        target: "realty_capital::monte_carlo",
        scenario = %input.scenario.name,
        iterations = config.iterations,
        correlated = plan.report().correlated,
        "simulation started"
    );

    let outcomes = execute(engine, &input.scenario, &shocks, config.workers, hooks)?;

    let mut iterations = Vec::with_capacity(outcomes.len());
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(kpis)) => iterations.push(IterationOutcome {
                index,
                shocks: shocks[index],
                kpis,
            }),
            Some(Err(e)) => {
                tracing::warn!(target: "realty_capital::monte_carlo", iteration = index, "simulation aborted: {e}");
                return Err(CapitalError::SimulationFailure {
                    iteration: index,
                    message: e.to_string(),
                });
            }
            None => {}
        }
    }

    let completed = iterations.len();
    let cancelled = completed < config.iterations;
    if cancelled {
        warnings.push(format!(
            "simulation cancelled after {completed} of {} iterations; statistics cover completed iterations only",
            config.iterations
        ));
    }

    let statistics = Kpi::ALL
        .iter()
        .filter_map(|&kpi| summarize(iterations.iter().map(|it| it.kpis.get(kpi))).map(|s| (kpi, s)))
        .collect();

    for w in &warnings {
        tracing::warn!(target: "realty_capital::monte_carlo", "{w}");
    }
    tracing::info!(
        target: "realty_capital::monte_carlo",
        completed,
        cancelled,
        "simulation finished"
    );

    Ok(SimulationResult {
        config: config.clone(),
        base_case: base.kpis,
        iterations,
        statistics,
        sampling: plan.report(),
        completed_iterations: completed,
        cancelled,
        warnings,
    })
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn validate_config(config: &SimulationConfig) -> CapitalResult<()> {
    if config.iterations == 0 {
        return Err(CapitalError::InvalidInput {
            field: "iterations".into(),
            reason: "at least one iteration is required".into(),
        });
    }
    if config.workers == Some(0) {
        return Err(CapitalError::InvalidInput {
            field: "workers".into(),
            reason: "worker count must be at least 1".into(),
        });
    }
    Ok(())
}

type Outcome = Option<CapitalResult<KpiSnapshot>>;

/// Run every iteration on a dedicated pool. An iteration is skipped (`None`)
/// once another has failed or the run was cancelled.
fn execute(
    engine: &dyn RevenueEngine,
    scenario: &DealScenario,
    shocks: &[DriverShocks],
    workers: Option<usize>,
    hooks: SimulationHooks<'_>,
) -> CapitalResult<Vec<Outcome>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.unwrap_or(0))
        .build()
        .map_err(|e| CapitalError::InvalidInput {
            field: "workers".into(),
            reason: format!("cannot start worker pool: {e}"),
        })?;
    tracing::debug!(
        target: "realty_capital::monte_carlo",
        workers = pool.current_num_threads(),
        "worker pool ready"
    );

    let failed = AtomicBool::new(false);
    let total = shocks.len();
    let (tx, rx) = channel::unbounded::<ProgressEvent>();

    let outcomes = std::thread::scope(|s| {
        let reporter = s.spawn(move || report_progress(rx, total, hooks.on_progress));

        let outcomes: Vec<Outcome> = pool.install(|| {
            shocks
                .par_iter()
                .map_with(tx.clone(), |tx, shock| {
                    if failed.load(Ordering::SeqCst) || hooks.cancel.is_some_and(|c| c.is_cancelled()) {
                        return None;
                    }
                    let perturbed = scenario.perturbed(shock);
                    let mut iteration_warnings = Vec::new();
                    let result = run_pipeline(engine, &perturbed, &mut iteration_warnings).map(|o| o.kpis);
                    if result.is_err() {
                        failed.store(true, Ordering::SeqCst);
                    }
                    let _ = tx.send(ProgressEvent::Completed);
                    Some(result)
                })
                .collect()
        });

        let success = outcomes.iter().all(|o| matches!(o, Some(Ok(_))));
        let _ = tx.send(ProgressEvent::Finished { success });
        drop(tx);
        let _ = reporter.join();
        outcomes
    });

    Ok(outcomes)
}

/// Forward progress at whole-percent steps below 100, then 100 once on
/// success.
fn report_progress(
    events: Receiver<ProgressEvent>,
    total: usize,
    on_progress: Option<&(dyn Fn(u8) + Sync)>,
) {
    let mut completed = 0usize;
    let mut last: Option<u8> = None;
    for event in events {
        match event {
            ProgressEvent::Completed => {
                completed += 1;
                let pct = (completed * 100 / total.max(1)).min(99) as u8;
                if last.map_or(true, |l| pct > l) {
                    last = Some(pct);
                    if let Some(cb) = on_progress {
                        cb(pct);
                    }
                }
            }
            ProgressEvent::Finished { success } => {
                if success {
                    if let Some(cb) = on_progress {
                        cb(100);
                    }
                }
                break;
            }
        }
    }
}
