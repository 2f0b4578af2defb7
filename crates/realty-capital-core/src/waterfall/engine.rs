use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

use crate::error::CapitalError;
use crate::types::*;
use crate::waterfall::clawback;
use crate::waterfall::config::{
    resolve, CatchUp, ClawbackTrigger, EquityClass, ResolvedTier, ResolvedWaterfall, TierKind,
    WaterfallTier,
};
use crate::waterfall::ledger::{capped_allocation, split_exact, WaterfallLedger};
use crate::waterfall::returns::moic;
use crate::time_value::irr_opt;
use crate::CapitalResult;

// ---------------------------------------------------------------------------
// Input / output types
// ---------------------------------------------------------------------------

/// Input for a multi-year, multi-partner equity waterfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallInput {
    /// Owner-level levered cash flow per year (negative = capital call)
    pub owner_cash_flows: Vec<Money>,
    pub equity_classes: Vec<EquityClass>,
    /// Ordered waterfall tiers (executed top-to-bottom every year)
    pub tiers: Vec<WaterfallTier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerResult {
    pub id: String,
    pub name: String,
    /// Net cash per year: distributions, contributions and clawback
    pub cash_flows: Vec<Money>,
    pub cumulative_cash_flows: Vec<Money>,
    pub total_contributed: Money,
    pub total_distributed: Money,
    pub irr: Option<Rate>,
    pub moic: Option<Multiple>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallYear {
    pub year: u32,
    pub owner_cash_flow: Money,
    /// Partner id -> tier distributions (negative in contribution years)
    pub distributions: BTreeMap<String, Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clawback_adjustments: Option<BTreeMap<String, Money>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallResult {
    pub owner_cash_flows: Vec<Money>,
    pub partners: Vec<PartnerResult>,
    pub annual: Vec<WaterfallYear>,
    /// Total promote returned by promote partners through clawback
    pub total_clawback: Money,
}

impl WaterfallResult {
    pub fn partner(&self, id: &str) -> Option<&PartnerResult> {
        self.partners.iter().find(|p| p.id == id)
    }

    /// Aggregate distributions over aggregate contributions across partners.
    pub fn aggregate_moic(&self) -> Option<Multiple> {
        let contributed = self.partners.iter().map(|p| p.total_contributed).sum();
        let distributed = self.partners.iter().map(|p| p.total_distributed).sum();
        moic(distributed, contributed)
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run the equity waterfall over the owner cash-flow series.
///
/// Each year a negative owner cash flow is called from partners by
/// contribution share; a positive one is pushed through the tiers in order,
/// with cash a tier cannot use rolling into the next. Configuration is
/// validated in full before the first year is allocated.
pub fn run_waterfall(input: &WaterfallInput) -> CapitalResult<ComputationOutput<WaterfallResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let output = compute_waterfall(input, &mut warnings)?;
    for warning in &warnings {
        tracing::warn!(target: "realty_capital::waterfall", "{warning}");
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Multi-tier Equity Waterfall (ROC, pref, catch-up, promote, clawback)",
        &serde_json::json!({
            "years": input.owner_cash_flows.len(),
            "equity_classes": input.equity_classes.len(),
            "tiers": input.tiers.iter().map(|t| t.id.as_str()).collect::<Vec<_>>(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

/// Core computation without the envelope.
pub fn compute_waterfall(
    input: &WaterfallInput,
    warnings: &mut Vec<String>,
) -> CapitalResult<WaterfallResult> {
    let resolved = resolve(&input.equity_classes, &input.tiers)?;
    if input.owner_cash_flows.is_empty() {
        return Err(CapitalError::InsufficientData(
            "ownerCashFlows must contain at least one year".into(),
        ));
    }
    if resolved.tiers.is_empty() {
        warnings.push("No waterfall tiers configured; all cash is distributed pro-rata".into());
    }

    let ledger = allocate(&resolved, &input.owner_cash_flows, true, warnings)?;
    Ok(build_result(&resolved, &input.owner_cash_flows, &ledger))
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Allocate every year of `owner` through the resolved tiers.
pub(crate) fn allocate(
    resolved: &ResolvedWaterfall,
    owner: &[Money],
    apply_clawback: bool,
    warnings: &mut Vec<String>,
) -> CapitalResult<WaterfallLedger> {
    let n = resolved.partners.len();
    let years = owner.len();
    let mut ledger = WaterfallLedger::new(n, resolved.tiers.len(), years);
    let contribution_shares = resolved.contribution_shares();
    let default_shares = resolved.default_shares();

    for (t, &cash) in owner.iter().enumerate() {
        if t > 0 {
            accrue(resolved, &mut ledger);
        }

        if cash < Decimal::ZERO {
            let calls = split_exact(-cash, &contribution_shares);
            for (p, amount) in calls.into_iter().enumerate() {
                ledger.accounts[p].contributed += amount;
                ledger.flows[p][t] -= amount;
                for k in hurdle_tiers(resolved) {
                    ledger.tier_balances[k][p] += amount;
                }
            }
        } else if cash > Decimal::ZERO {
            let mut remaining = cash;
            for (k, tier) in resolved.tiers.iter().enumerate() {
                if remaining <= Decimal::ZERO {
                    break;
                }
                remaining = run_tier(resolved, k, tier, remaining, t, t + 1 == years, &mut ledger, warnings);
            }
            if remaining > Decimal::ZERO {
                let sweep = split_exact(remaining, &default_shares);
                for (p, amount) in sweep.iter().enumerate() {
                    ledger.accounts[p].profit_received += *amount;
                }
                pay(resolved, &mut ledger, t, &sweep);
                ledger.residual[t] = remaining;
                if !resolved.tiers.is_empty() {
                    warnings.push(format!(
                        "Year {t}: {remaining} left after the last tier was distributed pro-rata"
                    ));
                }
            }
        }

        forfeit_non_cumulative(resolved, &mut ledger);

        if apply_clawback {
            if let Some((_, _, config)) = resolved.clawback_tier() {
                let due = match config.trigger {
                    ClawbackTrigger::Annual => true,
                    ClawbackTrigger::FinalPeriod => t + 1 == years,
                };
                if due {
                    clawback::apply(resolved, owner, t, &mut ledger)?;
                }
            }
        }
    }

    Ok(ledger)
}

/// Start-of-year accrual on balances carried from the prior year.
fn accrue(resolved: &ResolvedWaterfall, ledger: &mut WaterfallLedger) {
    for (k, tier) in resolved.tiers.iter().enumerate() {
        match &tier.kind {
            TierKind::PreferredReturn {
                preferred_rate,
                accrual,
                compound_pref,
            } => {
                let compounding = accrual.compounds() || *compound_pref;
                for p in 0..ledger.partners() {
                    let mut base = ledger.accounts[p].unreturned_capital();
                    if compounding {
                        base += ledger.tier_balances[k][p];
                    }
                    ledger.tier_balances[k][p] += base * *preferred_rate;
                }
            }
            TierKind::Promote {
                hurdle_irr: Some(h),
            } => {
                for balance in ledger.tier_balances[k].iter_mut() {
                    *balance *= Decimal::ONE + *h;
                }
            }
            TierKind::Promote { hurdle_irr: None } | TierKind::ReturnOfCapital => {}
        }
    }
}

fn forfeit_non_cumulative(resolved: &ResolvedWaterfall, ledger: &mut WaterfallLedger) {
    for (k, tier) in resolved.tiers.iter().enumerate() {
        if let TierKind::PreferredReturn { accrual, .. } = &tier.kind {
            if accrual.forfeits_unpaid() {
                ledger.tier_balances[k].iter_mut().for_each(|b| *b = Decimal::ZERO);
            }
        }
    }
}

fn hurdle_tiers(resolved: &ResolvedWaterfall) -> impl Iterator<Item = usize> + '_ {
    resolved.tiers.iter().enumerate().filter_map(|(k, t)| {
        matches!(t.kind, TierKind::Promote { hurdle_irr: Some(_) }).then_some(k)
    })
}

/// Record a distribution and draw down every open hurdle balance.
fn pay(resolved: &ResolvedWaterfall, ledger: &mut WaterfallLedger, t: usize, amounts: &[Money]) {
    for (p, amount) in amounts.iter().enumerate() {
        if amount.is_zero() {
            continue;
        }
        ledger.flows[p][t] += *amount;
        for k in hurdle_tiers(resolved) {
            let balance = &mut ledger.tier_balances[k][p];
            *balance = (*balance - *amount).max(Decimal::ZERO);
        }
    }
}

/// Run one tier against `remaining` cash and return what is left.
#[allow(clippy::too_many_arguments)]
fn run_tier(
    resolved: &ResolvedWaterfall,
    k: usize,
    tier: &ResolvedTier,
    remaining: Money,
    t: usize,
    final_year: bool,
    ledger: &mut WaterfallLedger,
    warnings: &mut Vec<String>,
) -> Money {
    let mut remaining = remaining;
    match &tier.kind {
        TierKind::ReturnOfCapital => {
            let caps: Vec<Money> = ledger.accounts.iter().map(|a| a.unreturned_capital()).collect();
            let alloc = capped_allocation(remaining, &tier.splits, &caps);
            for (p, amount) in alloc.iter().enumerate() {
                ledger.accounts[p].capital_returned += *amount;
            }
            remaining -= alloc.iter().copied().sum::<Decimal>();
            pay(resolved, ledger, t, &alloc);
        }
        TierKind::PreferredReturn { .. } => {
            let caps = ledger.tier_balances[k].clone();
            let alloc = capped_allocation(remaining, &tier.splits, &caps);
            for (p, amount) in alloc.iter().enumerate() {
                ledger.tier_balances[k][p] -= *amount;
                ledger.accounts[p].profit_received += *amount;
            }
            remaining -= alloc.iter().copied().sum::<Decimal>();
            pay(resolved, ledger, t, &alloc);
        }
        TierKind::Promote { hurdle_irr } => {
            if let Some(catch_up) = &tier.catch_up {
                let (alloc, shortfall) = catch_up_allocation(resolved, tier, catch_up, remaining, ledger);
                if final_year && shortfall > Decimal::ZERO {
                    warnings.push(format!(
                        "Tier '{}': catch-up short by {shortfall} when cash ran out in year {t}",
                        tier.id
                    ));
                }
                remaining -= record_promote(resolved, tier, &alloc, ledger, t);
            }
            if remaining <= Decimal::ZERO {
                return remaining;
            }

            let take = match hurdle_irr {
                Some(_) => {
                    let measured = tier.measured();
                    let open: Money = (0..ledger.partners())
                        .filter(|&p| measured[p])
                        .map(|p| ledger.tier_balances[k][p])
                        .sum();
                    let share: Rate = (0..ledger.partners())
                        .filter(|&p| measured[p])
                        .map(|p| tier.splits[p])
                        .sum();
                    // Validation guarantees a non-zero measured share
                    (open / share).min(remaining)
                }
                None => remaining,
            };
            if take > Decimal::ZERO {
                let alloc = split_exact(take, &tier.splits);
                remaining -= record_promote(resolved, tier, &alloc, ledger, t);
            }
        }
    }
    remaining
}

/// Catch-up cash that brings the promote partners' share of cumulative
/// profit up to the target, and the shortfall if `available` runs out.
fn catch_up_allocation(
    resolved: &ResolvedWaterfall,
    tier: &ResolvedTier,
    catch_up: &CatchUp,
    available: Money,
    ledger: &WaterfallLedger,
) -> (Vec<Money>, Money) {
    let n = resolved.partners.len();
    let promote_profit: Money = (0..n)
        .filter(|&p| tier.promote[p])
        .map(|p| ledger.accounts[p].profit_received)
        .sum();
    let total_profit: Money = ledger.accounts.iter().map(|a| a.profit_received).sum();

    let needed = (catch_up.target_split * total_profit - promote_profit)
        / (catch_up.rate - catch_up.target_split);
    if needed <= Decimal::ZERO {
        return (vec![Decimal::ZERO; n], Decimal::ZERO);
    }
    let amount = needed.min(available);

    let masked = |promote: bool| -> Vec<Rate> {
        (0..n)
            .map(|p| if tier.promote[p] == promote { tier.splits[p] } else { Decimal::ZERO })
            .collect()
    };
    let others = masked(false);
    let to_promote = if others.iter().all(|w| w.is_zero()) {
        amount
    } else {
        amount * catch_up.rate
    };

    let mut alloc = split_exact(to_promote, &masked(true));
    for (p, part) in split_exact(amount - to_promote, &others).into_iter().enumerate() {
        alloc[p] += part;
    }
    (alloc, needed - amount)
}

/// Pay a promote-tier allocation, tracking profit and promote received.
/// Returns the amount paid.
fn record_promote(
    resolved: &ResolvedWaterfall,
    tier: &ResolvedTier,
    alloc: &[Money],
    ledger: &mut WaterfallLedger,
    t: usize,
) -> Money {
    let paid: Money = alloc.iter().copied().sum();
    for (p, amount) in alloc.iter().enumerate() {
        let account = &mut ledger.accounts[p];
        account.profit_received += *amount;
        if tier.promote[p] {
            let pro_rata = resolved.partners[p].default_share * paid;
            account.promote_received += (*amount - pro_rata).max(Decimal::ZERO);
        }
    }
    pay(resolved, ledger, t, alloc);
    paid
}

// ---------------------------------------------------------------------------
// Result assembly
// ---------------------------------------------------------------------------

fn build_result(
    resolved: &ResolvedWaterfall,
    owner: &[Money],
    ledger: &WaterfallLedger,
) -> WaterfallResult {
    let years = owner.len();

    let partners = resolved
        .partners
        .iter()
        .enumerate()
        .map(|(p, partner)| {
            let cash_flows: Vec<Money> = (0..years).map(|t| ledger.net(p, t)).collect();
            let cumulative_cash_flows = cash_flows
                .iter()
                .scan(Decimal::ZERO, |acc, cf| {
                    *acc += *cf;
                    Some(*acc)
                })
                .collect();
            let distributed: Money = ledger.flows[p].iter().filter(|f| f.is_sign_positive()).sum::<Money>()
                + ledger.adjustments[p].iter().copied().sum::<Money>();
            let contributed = ledger.accounts[p].contributed;
            PartnerResult {
                id: partner.id.clone(),
                name: partner.name.clone(),
                irr: irr_opt(&cash_flows),
                moic: moic(distributed, contributed),
                cash_flows,
                cumulative_cash_flows,
                total_contributed: contributed,
                total_distributed: distributed,
            }
        })
        .collect();

    let annual = (0..years)
        .map(|t| {
            let distributions = resolved
                .partners
                .iter()
                .enumerate()
                .map(|(p, partner)| (partner.id.clone(), ledger.flows[p][t]))
                .collect();
            let has_adjustment = (0..resolved.partners.len()).any(|p| !ledger.adjustments[p][t].is_zero());
            let clawback_adjustments = has_adjustment.then(|| {
                resolved
                    .partners
                    .iter()
                    .enumerate()
                    .map(|(p, partner)| (partner.id.clone(), ledger.adjustments[p][t]))
                    .collect()
            });
            WaterfallYear {
                year: t as u32,
                owner_cash_flow: owner[t],
                distributions,
                clawback_adjustments,
            }
        })
        .collect();

    WaterfallResult {
        owner_cash_flows: owner.to_vec(),
        partners,
        annual,
        total_clawback: ledger.accounts.iter().map(|a| a.clawed_back).sum(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
