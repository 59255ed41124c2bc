use async_trait::async_trait;

use crate::{
    catalog::{BenefitDefinition, EventAllocation, EventDefinition, PackageBenefit},
    consumption::{ConsumptionRecord, EventConsumption, Fulfillment},
    error::StoreError,
    overrides::{OrganizationAllocationOverride, OrganizationBenefitOverride},
    types::PeriodYear,
};

/// Read and write queries the engine issues against the storage collaborator.
///
/// Year filters are optional. When a year is given, evergreen benefit
/// overrides (`period_year = None`) must still be returned.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn package_benefits(&self, package_id: &str) -> Result<Vec<PackageBenefit>, StoreError>;

    async fn benefit_definitions(&self) -> Result<Vec<BenefitDefinition>, StoreError>;

    async fn benefit_overrides(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<OrganizationBenefitOverride>, StoreError>;

    async fn fulfillments(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<Fulfillment>, StoreError>;

    async fn event_definitions(&self) -> Result<Vec<EventDefinition>, StoreError>;

    async fn event_allocations(&self, tier_id: &str) -> Result<Vec<EventAllocation>, StoreError>;

    async fn allocation_overrides(
        &self,
        organization_id: &str,
    ) -> Result<Vec<OrganizationAllocationOverride>, StoreError>;

    async fn event_consumption(
        &self,
        organization_id: &str,
        event_id: &str,
    ) -> Result<EventConsumption, StoreError>;

    /// Whether a record with the same id is already stored.
    async fn record_exists(&self, record: &ConsumptionRecord) -> Result<bool, StoreError>;

    /// Plain insert. Callers wanting over-allocation protection go through
    /// `claims::ClaimCoordinator`.
    async fn record_consumption(&self, record: ConsumptionRecord) -> Result<(), StoreError>;
}
