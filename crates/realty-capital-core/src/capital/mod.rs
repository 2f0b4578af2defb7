pub mod engine;

pub use engine::{
    compute_capital_structure, run_capital_engine, CapitalEngineResult, CapitalInput, DebtKpi,
    LeveredFcfEntry, TrancheSummary, TrancheYearKpi, DSCR_COVENANT, LTV_CEILING,
};
