use rust_decimal::Decimal;

use crate::types::*;
use crate::waterfall::config::{ClawbackMethod, ResolvedWaterfall};
use crate::waterfall::engine::allocate;
use crate::waterfall::ledger::{split_exact, WaterfallLedger};
use crate::CapitalResult;

/// Evaluate the configured clawback at year `t` and record any zero-sum
/// adjustments in the ledger.
pub(crate) fn apply(
    resolved: &ResolvedWaterfall,
    owner: &[Money],
    t: usize,
    ledger: &mut WaterfallLedger,
) -> CapitalResult<()> {
    let Some((_, tier, config)) = resolved.clawback_tier() else {
        return Ok(());
    };

    let adjustments = match config.method {
        ClawbackMethod::Lookback => lookback(resolved, &tier.promote, t, ledger, |p| {
            tier.promote_pct(p, &resolved.partners)
        }),
        ClawbackMethod::HypotheticalLiquidation => {
            hypothetical_liquidation(resolved, &tier.promote, owner, t, ledger)?
        }
    };

    if let Some(amounts) = adjustments {
        tracing::debug!(year = t, method = ?config.method, "clawback adjustment recorded");
        ledger.record_adjustments(t, &amounts);
    }
    Ok(())
}

/// Cap each promote partner's promote at its promote percentage of deal
/// profit to date; the excess goes back to the other partners pro-rata.
fn lookback(
    resolved: &ResolvedWaterfall,
    promote: &[bool],
    t: usize,
    ledger: &WaterfallLedger,
    promote_pct: impl Fn(usize) -> Rate,
) -> Option<Vec<Money>> {
    let n = resolved.partners.len();
    let profit = ledger.deal_profit(t).max(Decimal::ZERO);

    let mut amounts = vec![Decimal::ZERO; n];
    let mut returned = Decimal::ZERO;
    for p in (0..n).filter(|&p| promote[p]) {
        let account = &ledger.accounts[p];
        let allowed = promote_pct(p) * profit;
        let excess = account.promote_received - account.clawed_back - allowed;
        if excess > Decimal::ZERO {
            amounts[p] -= excess;
            returned += excess;
        }
    }
    if returned.is_zero() {
        return None;
    }

    let weights: Vec<Rate> = (0..n)
        .map(|p| {
            if promote[p] {
                Decimal::ZERO
            } else {
                resolved.partners[p].default_share
            }
        })
        .collect();
    if weights.iter().all(|w| w.is_zero()) {
        return None;
    }
    for (p, part) in split_exact(returned, &weights).into_iter().enumerate() {
        amounts[p] += part;
    }
    Some(amounts)
}

/// Re-run the waterfall on the series through `t` with later capital calls
/// netted against earlier distributions, then true up every partner to what
/// that liquidation would have paid. Applies only when a promote partner
/// has been overpaid.
fn hypothetical_liquidation(
    resolved: &ResolvedWaterfall,
    promote: &[bool],
    owner: &[Money],
    t: usize,
    ledger: &WaterfallLedger,
) -> CapitalResult<Option<Vec<Money>>> {
    let netted = net_forward(&owner[..=t]);
    let mut scratch = Vec::new();
    let hypothetical = allocate(resolved, &netted, false, &mut scratch)?;

    let n = resolved.partners.len();
    let mut diffs: Vec<Money> = (0..n)
        .map(|p| hypothetical.cumulative(p, t) - ledger.cumulative(p, t))
        .collect();

    let overpaid = (0..n).any(|p| promote[p] && diffs[p] < Decimal::ZERO);
    if !overpaid || diffs.iter().all(|d| d.is_zero()) {
        return Ok(None);
    }

    // Both runs see the same total cash through t; force an exact zero sum.
    let others: Money = diffs[..n - 1].iter().copied().sum();
    diffs[n - 1] = -others;
    Ok(Some(diffs))
}

/// Offset each capital call against the most recent earlier distributions,
/// leaving only calls that no earlier distribution can absorb.
pub(crate) fn net_forward(series: &[Money]) -> Vec<Money> {
    let mut netted = series.to_vec();
    for s in 0..netted.len() {
        if netted[s] >= Decimal::ZERO {
            continue;
        }
        let mut need = -netted[s];
        for earlier in (0..s).rev() {
            if need.is_zero() {
                break;
            }
            if netted[earlier] > Decimal::ZERO {
                let take = netted[earlier].min(need);
                netted[earlier] -= take;
                need -= take;
            }
        }
        netted[s] = -need;
    }
    netted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::waterfall::config::{
        Clawback, ClawbackTrigger, EquityClass, TierKind, WaterfallTier,
    };
    use crate::waterfall::engine::{compute_waterfall, WaterfallInput};
    use rust_decimal_macros::dec;

    #[test]
    fn test_net_forward_offsets_latest_first() {
        let netted = net_forward(&[dec!(-100), dec!(50), dec!(80), dec!(-100), dec!(200)]);
        assert_eq!(netted, vec![dec!(-100), dec!(30), dec!(0), dec!(0), dec!(200)]);
    }

    #[test]
    fn test_net_forward_keeps_unabsorbed_call() {
        let netted = net_forward(&[dec!(-100), dec!(20), dec!(-50)]);
        assert_eq!(netted, vec![dec!(-100), dec!(0), dec!(-30)]);
    }

    fn input(method: ClawbackMethod) -> WaterfallInput {
        WaterfallInput {
            owner_cash_flows: vec![dec!(-1000), dec!(1500), dec!(-600), dec!(300)],
            equity_classes: vec![
                EquityClass {
                    id: "lp".into(),
                    name: "Investor".into(),
                    contribution_pct: dec!(0.9),
                    distribution_pct: None,
                },
                EquityClass {
                    id: "gp".into(),
                    name: "Sponsor".into(),
                    contribution_pct: dec!(0.1),
                    distribution_pct: None,
                },
            ],
            tiers: vec![
                WaterfallTier {
                    id: "roc".into(),
                    kind: TierKind::ReturnOfCapital,
                    distribution_splits: Default::default(),
                    catch_up: None,
                    clawback: None,
                },
                WaterfallTier {
                    id: "promote".into(),
                    kind: TierKind::Promote { hurdle_irr: None },
                    distribution_splits: [("lp".to_string(), dec!(0.7)), ("gp".to_string(), dec!(0.3))]
                        .into_iter()
                        .collect(),
                    catch_up: None,
                    clawback: Some(Clawback {
                        trigger: ClawbackTrigger::FinalPeriod,
                        method,
                    }),
                },
            ],
        }
    }

    fn conserved(out: &crate::waterfall::engine::WaterfallResult) -> bool {
        out.annual.iter().all(|y| {
            let mut total: Money = y.distributions.values().copied().sum();
            if let Some(adj) = &y.clawback_adjustments {
                total += adj.values().copied().sum::<Money>();
            }
            total == y.owner_cash_flow
        })
    }

    #[test]
    fn test_lookback_returns_excess_promote() {
        let mut warnings = Vec::new();
        let out = compute_waterfall(&input(ClawbackMethod::Lookback), &mut warnings).unwrap();
        // Year 1 pays the sponsor 100 of promote above its pro-rata share.
        // Deal profit through year 3 is 200, of which 20% (40) may be kept.
        let adj = out.annual[3].clawback_adjustments.as_ref().unwrap();
        assert_eq!(adj["gp"], dec!(-60));
        assert_eq!(adj["lp"], dec!(60));
        assert_eq!(adj["gp"] + adj["lp"], Decimal::ZERO);
        assert!(out.total_clawback > Decimal::ZERO);
        assert!(conserved(&out));
    }

    #[test]
    fn test_hypothetical_liquidation_trues_up() {
        let mut warnings = Vec::new();
        let out =
            compute_waterfall(&input(ClawbackMethod::HypotheticalLiquidation), &mut warnings).unwrap();
        let adj = out.annual[3].clawback_adjustments.as_ref().unwrap();
        assert!(adj["gp"] < Decimal::ZERO);
        assert_eq!(adj.values().copied().sum::<Money>(), Decimal::ZERO);
        assert!(conserved(&out));
    }

    #[test]
    fn test_no_clawback_when_nothing_overpaid() {
        let mut i = input(ClawbackMethod::HypotheticalLiquidation);
        i.owner_cash_flows = vec![dec!(-1000), dec!(500), dec!(700)];
        let mut warnings = Vec::new();
        let out = compute_waterfall(&i, &mut warnings).unwrap();
        assert!(out.annual.iter().all(|y| y.clawback_adjustments.is_none()));
        assert_eq!(out.total_clawback, Decimal::ZERO);
    }
}
