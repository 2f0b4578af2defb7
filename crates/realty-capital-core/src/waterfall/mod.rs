pub mod clawback;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod returns;

pub use config::{
    CatchUp, Clawback, ClawbackMethod, ClawbackTrigger, EquityClass, PrefAccrual, TierKind,
    WaterfallTier,
};
pub use engine::{
    compute_waterfall, run_waterfall, PartnerResult, WaterfallInput, WaterfallResult,
    WaterfallYear,
};
pub use returns::{equity_multiple, moic, summarize, ReturnsSummary};
