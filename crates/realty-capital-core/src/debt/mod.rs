pub mod schedule;
pub mod tranche;

pub use schedule::{
    build_debt_schedule, build_tranche_schedule, schedule, schedule_monthly, DebtScheduleEntry,
    DebtScheduleInput, ForcedRepayment, RepaymentKind, TrancheSchedule,
};
pub use tranche::{AmortizationPolicy, DebtTranche, Seniority};
