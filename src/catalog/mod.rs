pub mod types;

use std::collections::BTreeMap;

pub use types::{
    AllocationField, BenefitDefinition, BenefitScope, EventAllocation, EventDefinition,
    PackageBenefit,
};

use crate::types::{BenefitId, EventId, PackageId, TierId};

/// Immutable reference data for one evaluation: benefit and event definitions
/// plus the tier/package defaults attached to them.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    benefits: BTreeMap<BenefitId, BenefitDefinition>,
    package_benefits: BTreeMap<(PackageId, BenefitId), PackageBenefit>,
    events: BTreeMap<EventId, EventDefinition>,
    allocations: BTreeMap<(TierId, EventId), EventAllocation>,
}

impl Catalog {
    pub fn new(
        benefits: impl IntoIterator<Item = BenefitDefinition>,
        package_benefits: impl IntoIterator<Item = PackageBenefit>,
        events: impl IntoIterator<Item = EventDefinition>,
        allocations: impl IntoIterator<Item = EventAllocation>,
    ) -> Self {
        let benefits = benefits
            .into_iter()
            .map(|benefit| (benefit.benefit_id.clone(), benefit))
            .collect();
        let package_benefits = package_benefits
            .into_iter()
            .map(|link| ((link.package_id.clone(), link.benefit_id.clone()), link))
            .collect();
        let events = events
            .into_iter()
            .map(|event| (event.event_id.clone(), event))
            .collect();
        let allocations = allocations
            .into_iter()
            .map(|row| ((row.tier_id.clone(), row.event_id.clone()), row))
            .collect();

        Self {
            benefits,
            package_benefits,
            events,
            allocations,
        }
    }

    pub fn benefit(&self, benefit_id: &str) -> Option<&BenefitDefinition> {
        self.benefits.get(benefit_id)
    }

    pub fn package_benefit(&self, package_id: &str, benefit_id: &str) -> Option<&PackageBenefit> {
        self.package_benefits
            .get(&(package_id.to_string(), benefit_id.to_string()))
    }

    pub fn package_benefits<'a>(
        &'a self,
        package_id: &'a str,
    ) -> impl Iterator<Item = &'a PackageBenefit> + 'a {
        self.package_benefits
            .values()
            .filter(move |link| link.package_id == package_id)
    }

    pub fn event(&self, event_id: &str) -> Option<&EventDefinition> {
        self.events.get(event_id)
    }

    pub fn allocation(&self, tier_id: &str, event_id: &str) -> Option<&EventAllocation> {
        self.allocations
            .get(&(tier_id.to_string(), event_id.to_string()))
    }

    pub fn allocations_for_tier<'a>(
        &'a self,
        tier_id: &'a str,
    ) -> impl Iterator<Item = &'a EventAllocation> + 'a {
        self.allocations
            .values()
            .filter(move |row| row.tier_id == tier_id)
    }
}
