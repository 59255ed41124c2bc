use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{BenefitDefinition, Catalog, PackageBenefit},
    consumption::{Fulfillment, aggregate_consumption, in_scope},
    overrides::{OverrideMode, OverrideStore},
    resolver::{Entitlement, resolve_benefit},
    types::{EvaluationContext, OrganizationId, PeriodYear, UNLIMITED},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub entitled: i64,
    pub fulfilled: i64,
    /// `-1` when unlimited, otherwise never negative.
    pub remaining: i64,
    pub is_unlimited: bool,
}

impl Balance {
    pub fn can_claim(&self, units: i64) -> bool {
        self.is_unlimited || self.remaining >= units
    }
}

pub fn compute_balance(effective: &Entitlement, fulfilled_quantity: i64) -> Balance {
    let fulfilled = fulfilled_quantity.max(0);
    if effective.is_unlimited {
        return Balance {
            entitled: UNLIMITED,
            fulfilled,
            remaining: UNLIMITED,
            is_unlimited: true,
        };
    }

    let entitled = effective.quantity.max(0);
    Balance {
        entitled,
        fulfilled,
        remaining: entitled.saturating_sub(fulfilled).max(0),
        is_unlimited: false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitBalanceRow {
    pub benefit: BenefitDefinition,
    pub in_package: bool,
    /// Granted at all. The only meaningful figure for non-quantifiable
    /// benefits.
    pub included: bool,
    pub entitlement: Entitlement,
    #[serde(flatten)]
    pub balance: Balance,
    pub scheduled_count: usize,
    pub has_override: bool,
    #[serde(default)]
    pub override_mode: Option<OverrideMode>,
    /// Records in scope for the target year, for detail rendering.
    pub fulfillments: Vec<Fulfillment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitReport {
    pub organization_id: OrganizationId,
    pub target_year: PeriodYear,
    pub rows: Vec<BenefitBalanceRow>,
    /// Fulfillments pointing at benefits missing from the catalog.
    pub skipped_orphans: usize,
}

impl BenefitReport {
    pub fn row(&self, benefit_id: &str) -> Option<&BenefitBalanceRow> {
        self.rows
            .iter()
            .find(|row| row.benefit.benefit_id == benefit_id)
    }
}

/// Benefits reachable for the context: linked from its package or carrying an
/// override applicable to the target year.
fn reachable_benefits(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
) -> BTreeSet<String> {
    let mut reachable: BTreeSet<String> = ctx
        .package_id
        .as_deref()
        .map(|package_id| {
            catalog
                .package_benefits(package_id)
                .map(|link| link.benefit_id.clone())
                .collect()
        })
        .unwrap_or_default();
    reachable.extend(overrides.overridden_benefits(&ctx.organization_id, ctx.target_year));
    reachable
}

pub fn evaluate_benefit(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
    fulfillments: &[Fulfillment],
    benefit: &BenefitDefinition,
) -> Option<BenefitBalanceRow> {
    let package_benefit = ctx
        .package_id
        .as_deref()
        .and_then(|package_id| catalog.package_benefit(package_id, &benefit.benefit_id));
    let benefit_override =
        overrides.benefit_override(&ctx.organization_id, &benefit.benefit_id, ctx.target_year);

    if package_benefit.is_none() && benefit_override.is_none() {
        return None;
    }

    // A link to a non-quantifiable benefit grants it once, quantity or not.
    let included_link: PackageBenefit;
    let package_benefit = match package_benefit {
        Some(link) if !benefit.is_quantifiable && link.quantity.is_none() && !link.is_unlimited => {
            included_link = PackageBenefit {
                quantity: Some(1),
                ..link.clone()
            };
            Some(&included_link)
        }
        other => other,
    };

    let entitlement = resolve_benefit(package_benefit, benefit_override, ctx.target_year);
    if entitlement.is_zero() && benefit_override.is_none() {
        return None;
    }

    let own: Vec<&Fulfillment> = fulfillments
        .iter()
        .filter(|record| record.organization_id == ctx.organization_id)
        .filter(|record| record.benefit_id == benefit.benefit_id)
        .collect();
    let summary = aggregate_consumption(own.iter().copied(), benefit, ctx.target_year);

    Some(BenefitBalanceRow {
        benefit: benefit.clone(),
        in_package: package_benefit.is_some(),
        included: entitlement.is_included(),
        entitlement,
        balance: compute_balance(&entitlement, summary.fulfilled_quantity),
        scheduled_count: summary.scheduled_count,
        has_override: benefit_override.is_some(),
        override_mode: benefit_override.map(|row| row.override_mode),
        fulfillments: own
            .into_iter()
            .filter(|record| in_scope(benefit, record.period_year, ctx.target_year))
            .cloned()
            .collect(),
    })
}

pub fn evaluate_benefits(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
    fulfillments: &[Fulfillment],
) -> BenefitReport {
    let mut rows = Vec::new();

    for benefit_id in reachable_benefits(ctx, catalog, overrides) {
        let Some(benefit) = catalog.benefit(&benefit_id) else {
            tracing::warn!(
                target: "entitlements",
                organization_id = %ctx.organization_id,
                benefit_id = %benefit_id,
                "orphaned_override_skipped"
            );
            continue;
        };

        if let Some(row) = evaluate_benefit(ctx, catalog, overrides, fulfillments, benefit) {
            rows.push(row);
        }
    }

    rows.sort_by(|lhs, rhs| {
        lhs.benefit
            .category
            .cmp(&rhs.benefit.category)
            .then_with(|| lhs.benefit.label.cmp(&rhs.benefit.label))
            .then_with(|| lhs.benefit.benefit_id.cmp(&rhs.benefit.benefit_id))
    });

    let skipped_orphans = fulfillments
        .iter()
        .filter(|record| record.organization_id == ctx.organization_id)
        .filter(|record| catalog.benefit(&record.benefit_id).is_none())
        .count();
    if skipped_orphans > 0 {
        tracing::warn!(
            target: "entitlements",
            organization_id = %ctx.organization_id,
            skipped = skipped_orphans,
            "orphaned_consumption_skipped"
        );
    }

    tracing::debug!(
        target: "entitlements",
        organization_id = %ctx.organization_id,
        target_year = ctx.target_year,
        rows = rows.len(),
        "benefit_balances_evaluated"
    );

    BenefitReport {
        organization_id: ctx.organization_id.clone(),
        target_year: ctx.target_year,
        rows,
        skipped_orphans,
    }
}
