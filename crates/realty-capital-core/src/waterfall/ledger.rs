use rust_decimal::Decimal;

use crate::types::*;

/// Running position of one partner through the waterfall.
#[derive(Debug, Clone, Default)]
pub(crate) struct PartnerAccount {
    pub contributed: Money,
    pub capital_returned: Money,
    /// Distributions beyond return of capital
    pub profit_received: Money,
    /// Distributions above the partner's pro-rata share of promote tiers
    pub promote_received: Money,
    pub clawed_back: Money,
}

impl PartnerAccount {
    pub fn unreturned_capital(&self) -> Money {
        (self.contributed - self.capital_returned).max(Decimal::ZERO)
    }
}

/// Per-partner, per-year record of an allocation run.
#[derive(Debug, Clone)]
pub(crate) struct WaterfallLedger {
    pub accounts: Vec<PartnerAccount>,
    /// Per tier, per partner: unpaid pref for preferred tiers, open hurdle
    /// balance for promote tiers with an IRR hurdle
    pub tier_balances: Vec<Vec<Money>>,
    /// `flows[p][t]`: distribution (positive) or contribution (negative)
    pub flows: Vec<Vec<Money>>,
    /// `adjustments[p][t]`: clawback corrections, zero-sum per year
    pub adjustments: Vec<Vec<Money>>,
    /// Cash swept pro-rata after the last tier, by year
    pub residual: Vec<Money>,
}

impl WaterfallLedger {
    pub fn new(partners: usize, tiers: usize, years: usize) -> Self {
        Self {
            accounts: vec![PartnerAccount::default(); partners],
            tier_balances: vec![vec![Decimal::ZERO; partners]; tiers],
            flows: vec![vec![Decimal::ZERO; years]; partners],
            adjustments: vec![vec![Decimal::ZERO; years]; partners],
            residual: vec![Decimal::ZERO; years],
        }
    }

    pub fn partners(&self) -> usize {
        self.accounts.len()
    }

    /// Net cash to partner `p` in year `t`, clawback included.
    pub fn net(&self, p: usize, t: usize) -> Money {
        self.flows[p][t] + self.adjustments[p][t]
    }

    /// Cumulative net cash to partner `p` through year `t`.
    pub fn cumulative(&self, p: usize, t: usize) -> Money {
        (0..=t).map(|s| self.net(p, s)).sum()
    }

    /// Deal-level profit through year `t`: everything paid out less
    /// everything contributed.
    pub fn deal_profit(&self, t: usize) -> Money {
        (0..self.partners()).map(|p| self.cumulative(p, t)).sum()
    }

    pub fn record_adjustments(&mut self, t: usize, amounts: &[Money]) {
        for (p, amount) in amounts.iter().enumerate() {
            if amount.is_zero() {
                continue;
            }
            self.adjustments[p][t] += *amount;
            let account = &mut self.accounts[p];
            account.profit_received += *amount;
            if amount.is_sign_negative() {
                account.clawed_back -= *amount;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Allocation helpers
// ---------------------------------------------------------------------------

/// Split `amount` by `weights` (assumed to sum to 1). The last partner with
/// a non-zero weight takes the remainder so the parts sum exactly.
pub(crate) fn split_exact(amount: Money, weights: &[Rate]) -> Vec<Money> {
    let mut parts = vec![Decimal::ZERO; weights.len()];
    let total_weight: Decimal = weights.iter().copied().sum();
    let last = weights.iter().rposition(|w| !w.is_zero());
    let (Some(last), false) = (last, total_weight.is_zero()) else {
        return parts;
    };
    let mut given = Decimal::ZERO;
    for (i, w) in weights.iter().enumerate() {
        if i == last {
            parts[i] = amount - given;
            break;
        }
        let part = amount * *w / total_weight;
        parts[i] = part;
        given += part;
    }
    parts
}

/// Allocate up to `amount` in proportion to `weights`, never giving a partner
/// more than its cap. Cash a saturated partner cannot take is re-spread over
/// the others until every partner is capped or the cash runs out.
pub(crate) fn capped_allocation(amount: Money, weights: &[Rate], caps: &[Money]) -> Vec<Money> {
    let n = weights.len();
    let mut alloc = vec![Decimal::ZERO; n];
    let mut left = amount;

    loop {
        if left <= Decimal::ZERO {
            break;
        }
        let active: Vec<usize> = (0..n)
            .filter(|&i| weights[i] > Decimal::ZERO && caps[i] - alloc[i] > Decimal::ZERO)
            .collect();
        if active.is_empty() {
            break;
        }
        let weight: Decimal = active.iter().map(|&i| weights[i]).sum();
        let saturated: Vec<usize> = active
            .iter()
            .copied()
            .filter(|&i| left * weights[i] / weight >= caps[i] - alloc[i])
            .collect();

        if saturated.is_empty() {
            let active_weights: Vec<Rate> = active.iter().map(|&i| weights[i]).collect();
            for (k, part) in split_exact(left, &active_weights).into_iter().enumerate() {
                alloc[active[k]] += part;
            }
            break;
        }
        for i in saturated {
            let room = caps[i] - alloc[i];
            alloc[i] += room;
            left -= room;
        }
    }
    alloc
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_split_exact_sums() {
        let parts = split_exact(dec!(100), &[dec!(1) / dec!(3), dec!(1) / dec!(3), dec!(1) / dec!(3)]);
        assert_eq!(parts.iter().copied().sum::<Decimal>(), dec!(100));
    }

    #[test]
    fn test_split_exact_skips_zero_weight_tail() {
        let parts = split_exact(dec!(10), &[dec!(1), dec!(0)]);
        assert_eq!(parts, vec![dec!(10), dec!(0)]);
    }

    #[test]
    fn test_capped_allocation_respreads() {
        let alloc = capped_allocation(dec!(100), &[dec!(0.5), dec!(0.5)], &[dec!(20), dec!(200)]);
        assert_eq!(alloc, vec![dec!(20), dec!(80)]);
    }

    #[test]
    fn test_capped_allocation_stops_at_caps() {
        let alloc = capped_allocation(dec!(100), &[dec!(0.9), dec!(0.1)], &[dec!(9), dec!(1)]);
        assert_eq!(alloc, vec![dec!(9), dec!(1)]);
    }

    #[test]
    fn test_ledger_adjustments_track_clawback() {
        let mut ledger = WaterfallLedger::new(2, 0, 2);
        ledger.flows[0][1] = dec!(50);
        ledger.record_adjustments(1, &[dec!(-5), dec!(5)]);
        assert_eq!(ledger.net(0, 1), dec!(45));
        assert_eq!(ledger.accounts[0].clawed_back, dec!(5));
        assert_eq!(ledger.deal_profit(1), dec!(50));
    }
}
