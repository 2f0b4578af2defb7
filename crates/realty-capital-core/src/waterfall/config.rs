use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::error::CapitalError;
use crate::types::*;
use crate::CapitalResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// A class of equity (an LP, the sponsor/GP, a co-investor).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityClass {
    pub id: String,
    pub name: String,
    /// Share of every capital call funded by this class
    pub contribution_pct: Rate,
    /// Pro-rata share used where a tier gives no split; defaults to
    /// `contribution_pct`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distribution_pct: Option<Rate>,
}

impl EquityClass {
    pub fn default_share(&self) -> Rate {
        self.distribution_pct.unwrap_or(self.contribution_pct)
    }
}

/// How a preferred return accrues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrefAccrual {
    /// Simple accrual; unpaid pref carries forward
    #[default]
    #[serde(rename = "CUMULATIVE")]
    Cumulative,
    /// Simple accrual; unpaid pref is forfeited at year end
    #[serde(rename = "NON_CUMULATIVE")]
    NonCumulative,
    /// Accrues on capital plus unpaid pref, equivalent to an IRR hurdle
    #[serde(rename = "irr_hurdle")]
    IrrHurdle,
    /// Accrues on capital plus unpaid pref
    #[serde(rename = "compound_interest")]
    CompoundInterest,
}

impl PrefAccrual {
    pub fn compounds(self) -> bool {
        matches!(self, PrefAccrual::IrrHurdle | PrefAccrual::CompoundInterest)
    }

    pub fn forfeits_unpaid(self) -> bool {
        matches!(self, PrefAccrual::NonCumulative)
    }
}

/// Distribution mechanics for a waterfall tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TierKind {
    /// Return contributed capital, capped at each partner's unreturned amount
    ReturnOfCapital,
    /// Pay accrued preferred return
    #[serde(rename_all = "camelCase")]
    PreferredReturn {
        preferred_rate: Rate,
        #[serde(default)]
        accrual: PrefAccrual,
        /// Compound unpaid pref regardless of the accrual method
        #[serde(default)]
        compound_pref: bool,
    },
    /// Split cash per the tier split, optionally only up to an IRR hurdle
    #[serde(rename_all = "camelCase")]
    Promote {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hurdle_irr: Option<Rate>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatchUp {
    /// Share of cumulative profit the promote partners catch up to
    pub target_split: Rate,
    /// Share of catch-up cash routed to the promote partners
    pub rate: Rate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClawbackTrigger {
    FinalPeriod,
    Annual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClawbackMethod {
    HypotheticalLiquidation,
    Lookback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clawback {
    pub trigger: ClawbackTrigger,
    pub method: ClawbackMethod,
}

/// A single tier of the waterfall, executed in configured order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallTier {
    pub id: String,
    pub kind: TierKind,
    /// Partner id -> share of this tier's cash. Empty means pro-rata to
    /// default shares.
    #[serde(default)]
    pub distribution_splits: BTreeMap<String, Rate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catch_up: Option<CatchUp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clawback: Option<Clawback>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub(crate) struct Partner {
    pub id: String,
    pub name: String,
    pub contribution_pct: Rate,
    pub default_share: Rate,
}

/// A tier with splits resolved to partner order.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedTier {
    pub id: String,
    pub kind: TierKind,
    pub splits: Vec<Rate>,
    /// Partners whose share of this tier exceeds their default share
    pub promote: Vec<bool>,
    pub catch_up: Option<CatchUp>,
    pub clawback: Option<Clawback>,
}

impl ResolvedTier {
    pub fn has_promote(&self) -> bool {
        self.promote.iter().any(|p| *p)
    }

    /// Partners an IRR hurdle is measured against: the non-promote
    /// partners, or everyone when the tier carries no promote.
    pub fn measured(&self) -> Vec<bool> {
        if self.has_promote() {
            self.promote.iter().map(|p| !p).collect()
        } else {
            vec![true; self.promote.len()]
        }
    }

    pub fn promote_pct(&self, partner: usize, partners: &[Partner]) -> Rate {
        (self.splits[partner] - partners[partner].default_share).max(Decimal::ZERO)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedWaterfall {
    pub partners: Vec<Partner>,
    pub tiers: Vec<ResolvedTier>,
}

impl ResolvedWaterfall {
    pub fn default_shares(&self) -> Vec<Rate> {
        self.partners.iter().map(|p| p.default_share).collect()
    }

    pub fn contribution_shares(&self) -> Vec<Rate> {
        self.partners.iter().map(|p| p.contribution_pct).collect()
    }

    /// The first tier configured with a clawback, with its index.
    pub fn clawback_tier(&self) -> Option<(usize, &ResolvedTier, &Clawback)> {
        self.tiers
            .iter()
            .enumerate()
            .find_map(|(i, t)| t.clawback.as_ref().map(|c| (i, t, c)))
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate equity classes and tiers and resolve splits to partner order.
/// Every configuration problem is reported before any year is allocated.
pub(crate) fn resolve(
    classes: &[EquityClass],
    tiers: &[WaterfallTier],
) -> CapitalResult<ResolvedWaterfall> {
    if classes.is_empty() {
        return Err(CapitalError::config(
            "equityClasses",
            "at least one equity class is required",
        ));
    }

    let mut seen = HashSet::new();
    for class in classes {
        if !seen.insert(class.id.as_str()) {
            return Err(CapitalError::config(
                format!("equity class '{}'", class.id),
                "duplicate equity class id",
            ));
        }
        for (name, pct) in [
            ("contributionPct", Some(class.contribution_pct)),
            ("distributionPct", class.distribution_pct),
        ] {
            if let Some(pct) = pct {
                if pct < Decimal::ZERO || pct > Decimal::ONE {
                    return Err(CapitalError::config(
                        format!("equity class '{}'.{name}", class.id),
                        format!("{name} must be within [0, 1] (got {pct})"),
                    ));
                }
            }
        }
    }

    let contributions: Decimal = classes.iter().map(|c| c.contribution_pct).sum();
    if (contributions - Decimal::ONE).abs() > SHARE_TOLERANCE {
        return Err(CapitalError::config(
            "equityClasses.contributionPct",
            format!("contribution percentages must sum to 1.0 (got {contributions})"),
        ));
    }
    let defaults: Decimal = classes.iter().map(|c| c.default_share()).sum();
    if (defaults - Decimal::ONE).abs() > SHARE_TOLERANCE {
        return Err(CapitalError::config(
            "equityClasses.distributionPct",
            format!("distribution percentages must sum to 1.0 (got {defaults})"),
        ));
    }

    let partners: Vec<Partner> = classes
        .iter()
        .map(|c| Partner {
            id: c.id.clone(),
            name: c.name.clone(),
            contribution_pct: c.contribution_pct,
            default_share: c.default_share(),
        })
        .collect();

    let resolved = tiers
        .iter()
        .map(|tier| resolve_tier(tier, &partners))
        .collect::<CapitalResult<Vec<_>>>()?;

    Ok(ResolvedWaterfall {
        partners,
        tiers: resolved,
    })
}

fn resolve_tier(tier: &WaterfallTier, partners: &[Partner]) -> CapitalResult<ResolvedTier> {
    let field = |name: &str| format!("tier '{}'.{name}", tier.id);

    let splits: Vec<Rate> = if tier.distribution_splits.is_empty() {
        partners.iter().map(|p| p.default_share).collect()
    } else {
        if let Some(unknown) = tier
            .distribution_splits
            .keys()
            .find(|id| !partners.iter().any(|p| &p.id == *id))
        {
            return Err(CapitalError::config(
                field("distributionSplits"),
                format!("split names unknown equity class '{unknown}'"),
            ));
        }
        partners
            .iter()
            .map(|p| {
                tier.distribution_splits
                    .get(&p.id)
                    .copied()
                    .unwrap_or(Decimal::ZERO)
            })
            .collect()
    };

    if let Some(negative) = splits.iter().find(|s| s.is_sign_negative() && !s.is_zero()) {
        return Err(CapitalError::config(
            field("distributionSplits"),
            format!("split shares must be >= 0 (got {negative})"),
        ));
    }
    let total: Decimal = splits.iter().copied().sum();
    if (total - Decimal::ONE).abs() > SHARE_TOLERANCE {
        return Err(CapitalError::config(
            field("distributionSplits"),
            format!("distributionSplits must sum to 1.0 (got {total})"),
        ));
    }

    let promote: Vec<bool> = splits
        .iter()
        .zip(partners)
        .map(|(s, p)| *s > p.default_share + SHARE_TOLERANCE)
        .collect();

    let resolved = ResolvedTier {
        id: tier.id.clone(),
        kind: tier.kind.clone(),
        splits,
        promote,
        catch_up: tier.catch_up.clone(),
        clawback: tier.clawback.clone(),
    };

    match &tier.kind {
        TierKind::ReturnOfCapital => {}
        TierKind::PreferredReturn { preferred_rate, .. } => {
            if *preferred_rate < Decimal::ZERO {
                return Err(CapitalError::config(
                    field("preferredRate"),
                    format!("preferredRate must be >= 0 (got {preferred_rate})"),
                ));
            }
        }
        TierKind::Promote { hurdle_irr } => {
            if let Some(h) = hurdle_irr {
                if *h <= -Decimal::ONE {
                    return Err(CapitalError::config(
                        field("hurdleIrr"),
                        format!("hurdleIrr must be greater than -1 (got {h})"),
                    ));
                }
                let measured_share: Decimal = resolved
                    .measured()
                    .iter()
                    .zip(&resolved.splits)
                    .filter(|(m, _)| **m)
                    .map(|(_, s)| *s)
                    .sum();
                if measured_share.is_zero() {
                    return Err(CapitalError::config(
                        field("hurdleIrr"),
                        "a hurdle tier must give the measured partners a non-zero share",
                    ));
                }
            }
        }
    }

    if let Some(catch_up) = &tier.catch_up {
        if !matches!(tier.kind, TierKind::Promote { .. }) {
            return Err(CapitalError::config(
                field("catchUp"),
                "catch-up is only supported on promote tiers",
            ));
        }
        if !resolved.has_promote() {
            return Err(CapitalError::config(
                field("catchUp"),
                "catch-up requires a partner whose split exceeds its default share",
            ));
        }
        if catch_up.target_split <= Decimal::ZERO || catch_up.target_split >= Decimal::ONE {
            return Err(CapitalError::config(
                field("catchUp.targetSplit"),
                format!(
                    "targetSplit must be within (0, 1) (got {})",
                    catch_up.target_split
                ),
            ));
        }
        if catch_up.rate <= catch_up.target_split || catch_up.rate > Decimal::ONE {
            return Err(CapitalError::config(
                field("catchUp.rate"),
                format!(
                    "rate must exceed targetSplit and be <= 1 (got {})",
                    catch_up.rate
                ),
            ));
        }
    }

    if tier.clawback.is_some() && !resolved.has_promote() {
        return Err(CapitalError::config(
            field("clawback"),
            "clawback requires a tier that pays a promote",
        ));
    }

    Ok(resolved)
}
