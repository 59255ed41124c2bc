use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::{
    overrides::types::{OrganizationAllocationOverride, OrganizationBenefitOverride},
    types::{BenefitId, EventId, OrganizationId, PeriodYear},
};

/// Organization-specific adjustments for one evaluation, indexed for lookup.
///
/// Lookup precedence, for benefit and event allocation overrides alike: an
/// override whose `period_year` equals the target year wins over an evergreen
/// (`period_year = None`) one; the two are never combined. When several rows compete inside the same class, the most
/// recently updated row wins (rows without `updated_at` count as oldest), ties
/// broken by the greatest `override_id`.
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    benefit_overrides: BTreeMap<(OrganizationId, BenefitId), Vec<OrganizationBenefitOverride>>,
    allocation_overrides: BTreeMap<(OrganizationId, EventId), Vec<OrganizationAllocationOverride>>,
}

impl OverrideStore {
    pub fn new(
        benefit_overrides: impl IntoIterator<Item = OrganizationBenefitOverride>,
        allocation_overrides: impl IntoIterator<Item = OrganizationAllocationOverride>,
    ) -> Self {
        let mut store = Self::default();
        for row in benefit_overrides {
            store
                .benefit_overrides
                .entry((row.organization_id.clone(), row.benefit_id.clone()))
                .or_default()
                .push(row);
        }
        for row in allocation_overrides {
            store
                .allocation_overrides
                .entry((row.organization_id.clone(), row.event_id.clone()))
                .or_default()
                .push(row);
        }
        store
    }

    pub fn benefit_override(
        &self,
        organization_id: &str,
        benefit_id: &str,
        target_year: PeriodYear,
    ) -> Option<&OrganizationBenefitOverride> {
        let rows = self
            .benefit_overrides
            .get(&(organization_id.to_string(), benefit_id.to_string()))?;
        let selected = select_for_year(rows, target_year);
        if selected.candidates > 1 {
            tracing::warn!(
                target: "entitlements",
                organization_id = organization_id,
                benefit_id = benefit_id,
                target_year = target_year,
                candidates = selected.candidates,
                "ambiguous_override_resolved"
            );
        }
        selected.row
    }

    pub fn allocation_override(
        &self,
        organization_id: &str,
        event_id: &str,
        target_year: PeriodYear,
    ) -> Option<&OrganizationAllocationOverride> {
        let rows = self
            .allocation_overrides
            .get(&(organization_id.to_string(), event_id.to_string()))?;
        let selected = select_for_year(rows, target_year);
        if selected.candidates > 1 {
            tracing::warn!(
                target: "entitlements",
                organization_id = organization_id,
                event_id = event_id,
                target_year = target_year,
                candidates = selected.candidates,
                "ambiguous_override_resolved"
            );
        }
        selected.row
    }

    /// Benefits that have at least one override applicable to `target_year`.
    pub fn overridden_benefits(
        &self,
        organization_id: &str,
        target_year: PeriodYear,
    ) -> Vec<BenefitId> {
        self.benefit_overrides
            .iter()
            .filter(|((org, _), rows)| {
                org == organization_id && rows.iter().any(|row| row.applies_to_year(target_year))
            })
            .map(|((_, benefit_id), _)| benefit_id.clone())
            .collect()
    }

    /// Events whose override for `target_year` actually adjusts a field.
    pub fn overridden_events(
        &self,
        organization_id: &str,
        target_year: PeriodYear,
    ) -> Vec<EventId> {
        self.allocation_overrides
            .iter()
            .filter(|((org, _), rows)| {
                org == organization_id
                    && select_for_year(rows.as_slice(), target_year)
                        .row
                        .is_some_and(OrganizationAllocationOverride::has_field_overrides)
            })
            .map(|((_, event_id), _)| event_id.clone())
            .collect()
    }
}

trait YearScoped {
    fn period_year(&self) -> Option<PeriodYear>;
    fn updated_at(&self) -> Option<OffsetDateTime>;
    fn override_id(&self) -> &str;
}

impl YearScoped for OrganizationBenefitOverride {
    fn period_year(&self) -> Option<PeriodYear> {
        self.period_year
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    fn override_id(&self) -> &str {
        &self.override_id
    }
}

impl YearScoped for OrganizationAllocationOverride {
    fn period_year(&self) -> Option<PeriodYear> {
        self.period_year
    }

    fn updated_at(&self) -> Option<OffsetDateTime> {
        self.updated_at
    }

    fn override_id(&self) -> &str {
        &self.override_id
    }
}

struct Selected<'a, T> {
    row: Option<&'a T>,
    candidates: usize,
}

fn select_for_year<T: YearScoped>(rows: &[T], target_year: PeriodYear) -> Selected<'_, T> {
    let year_scoped: Vec<&T> = rows
        .iter()
        .filter(|row| row.period_year() == Some(target_year))
        .collect();
    let candidates = if year_scoped.is_empty() {
        rows.iter().filter(|row| row.period_year().is_none()).collect()
    } else {
        year_scoped
    };

    Selected {
        candidates: candidates.len(),
        row: candidates.into_iter().max_by(|lhs, rhs| {
            lhs.updated_at()
                .cmp(&rhs.updated_at())
                .then_with(|| lhs.override_id().cmp(rhs.override_id()))
        }),
    }
}
