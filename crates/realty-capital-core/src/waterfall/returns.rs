use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::time_value::irr_opt;
use crate::types::*;

/// Return metrics for a single cash-flow series (negative = money in,
/// positive = money out).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnsSummary {
    pub total_contributed: Money,
    pub total_distributed: Money,
    pub net_profit: Money,
    pub irr: Option<Rate>,
    pub moic: Option<Multiple>,
}

/// Multiple on invested capital. `None` when nothing was invested.
pub fn moic(distributed: Money, contributed: Money) -> Option<Multiple> {
    if contributed <= Decimal::ZERO {
        None
    } else {
        Some(distributed / contributed)
    }
}

/// Total inflows over total outflows of a series.
pub fn equity_multiple(cash_flows: &[Money]) -> Option<Multiple> {
    let (contributed, distributed) = totals(cash_flows);
    moic(distributed, contributed)
}

pub fn summarize(cash_flows: &[Money]) -> ReturnsSummary {
    let (total_contributed, total_distributed) = totals(cash_flows);
    ReturnsSummary {
        total_contributed,
        total_distributed,
        net_profit: total_distributed - total_contributed,
        irr: irr_opt(cash_flows),
        moic: moic(total_distributed, total_contributed),
    }
}

fn totals(cash_flows: &[Money]) -> (Money, Money) {
    cash_flows
        .iter()
        .fold((Decimal::ZERO, Decimal::ZERO), |(out, inflow), cf| {
            if cf.is_sign_negative() {
                (out - *cf, inflow)
            } else {
                (out, inflow + *cf)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_summary_basic() {
        let s = summarize(&[dec!(-100), dec!(10), dec!(10), dec!(130)]);
        assert_eq!(s.total_contributed, dec!(100));
        assert_eq!(s.total_distributed, dec!(150));
        assert_eq!(s.moic, Some(dec!(1.5)));
        let irr = s.irr.unwrap();
        assert!(irr > dec!(0.15) && irr < dec!(0.17));
    }

    #[test]
    fn test_no_contribution_has_no_multiple() {
        assert_eq!(equity_multiple(&[dec!(0), dec!(50)]), None);
        assert_eq!(summarize(&[dec!(0), dec!(50)]).irr, None);
    }
}
