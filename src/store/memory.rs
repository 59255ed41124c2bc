use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{
    catalog::{BenefitDefinition, EventAllocation, EventDefinition, PackageBenefit},
    consumption::{
        ConsumptionRecord, EventConsumption, Fulfillment, SpeakerApplication,
        SymposiumRegistration, TicketClaim, VipDinnerRsvp,
    },
    error::StoreError,
    overrides::{OrganizationAllocationOverride, OrganizationBenefitOverride},
    store::ports::EntitlementStore,
    types::PeriodYear,
};

/// Full contents of a store. Also the on-disk snapshot body.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreContents {
    #[serde(default)]
    pub benefits: Vec<BenefitDefinition>,
    #[serde(default)]
    pub package_benefits: Vec<PackageBenefit>,
    #[serde(default)]
    pub events: Vec<EventDefinition>,
    #[serde(default)]
    pub event_allocations: Vec<EventAllocation>,
    #[serde(default)]
    pub benefit_overrides: Vec<OrganizationBenefitOverride>,
    #[serde(default)]
    pub allocation_overrides: Vec<OrganizationAllocationOverride>,
    #[serde(default)]
    pub fulfillments: Vec<Fulfillment>,
    #[serde(default)]
    pub ticket_claims: Vec<TicketClaim>,
    #[serde(default)]
    pub symposium_registrations: Vec<SymposiumRegistration>,
    #[serde(default)]
    pub vip_dinner_rsvps: Vec<VipDinnerRsvp>,
    #[serde(default)]
    pub speaker_applications: Vec<SpeakerApplication>,
}

impl StoreContents {
    fn contains_record(&self, record: &ConsumptionRecord) -> bool {
        let record_id = record.record_id();
        match record {
            ConsumptionRecord::Fulfillment(_) => self
                .fulfillments
                .iter()
                .any(|row| row.fulfillment_id == record_id),
            ConsumptionRecord::TicketClaim(_) => {
                self.ticket_claims.iter().any(|row| row.claim_id == record_id)
            }
            ConsumptionRecord::SymposiumRegistration(_) => self
                .symposium_registrations
                .iter()
                .any(|row| row.registration_id == record_id),
            ConsumptionRecord::VipDinnerRsvp(_) => {
                self.vip_dinner_rsvps.iter().any(|row| row.rsvp_id == record_id)
            }
        }
    }
}

/// Process-local store behind a tokio `RwLock`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    contents: RwLock<StoreContents>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new(contents: StoreContents) -> Self {
        Self {
            contents: RwLock::new(contents),
            unavailable: AtomicBool::new(false),
        }
    }

    pub async fn contents(&self) -> StoreContents {
        self.contents.read().await.clone()
    }

    pub async fn insert_benefit_override(&self, row: OrganizationBenefitOverride) {
        self.contents.write().await.benefit_overrides.push(row);
    }

    pub async fn insert_allocation_override(&self, row: OrganizationAllocationOverride) {
        self.contents.write().await.allocation_overrides.push(row);
    }

    pub async fn insert_speaker_application(&self, row: SpeakerApplication) {
        self.contents.write().await.speaker_applications.push(row);
    }

    /// Makes every query fail as if the backend were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn ensure_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn package_benefits(&self, package_id: &str) -> Result<Vec<PackageBenefit>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .contents
            .read()
            .await
            .package_benefits
            .iter()
            .filter(|link| link.package_id == package_id)
            .cloned()
            .collect())
    }

    async fn benefit_definitions(&self) -> Result<Vec<BenefitDefinition>, StoreError> {
        self.ensure_available()?;
        Ok(self.contents.read().await.benefits.clone())
    }

    async fn benefit_overrides(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<OrganizationBenefitOverride>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .contents
            .read()
            .await
            .benefit_overrides
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .filter(|row| period_year.is_none_or(|year| row.applies_to_year(year)))
            .cloned()
            .collect())
    }

    async fn fulfillments(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<Fulfillment>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .contents
            .read()
            .await
            .fulfillments
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .filter(|row| period_year.is_none_or(|year| row.period_year == Some(year)))
            .cloned()
            .collect())
    }

    async fn event_definitions(&self) -> Result<Vec<EventDefinition>, StoreError> {
        self.ensure_available()?;
        Ok(self.contents.read().await.events.clone())
    }

    async fn event_allocations(&self, tier_id: &str) -> Result<Vec<EventAllocation>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .contents
            .read()
            .await
            .event_allocations
            .iter()
            .filter(|row| row.tier_id == tier_id)
            .cloned()
            .collect())
    }

    async fn allocation_overrides(
        &self,
        organization_id: &str,
    ) -> Result<Vec<OrganizationAllocationOverride>, StoreError> {
        self.ensure_available()?;
        Ok(self
            .contents
            .read()
            .await
            .allocation_overrides
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn event_consumption(
        &self,
        organization_id: &str,
        event_id: &str,
    ) -> Result<EventConsumption, StoreError> {
        self.ensure_available()?;
        let contents = self.contents.read().await;
        let owned = |org: &str, event: &str| org == organization_id && event == event_id;

        Ok(EventConsumption {
            ticket_claims: contents
                .ticket_claims
                .iter()
                .filter(|row| owned(&row.organization_id, &row.event_id))
                .cloned()
                .collect(),
            symposium_registrations: contents
                .symposium_registrations
                .iter()
                .filter(|row| owned(&row.organization_id, &row.event_id))
                .cloned()
                .collect(),
            vip_dinner_rsvps: contents
                .vip_dinner_rsvps
                .iter()
                .filter(|row| owned(&row.organization_id, &row.event_id))
                .cloned()
                .collect(),
            speaker_applications: contents
                .speaker_applications
                .iter()
                .filter(|row| owned(&row.organization_id, &row.event_id))
                .cloned()
                .collect(),
        })
    }

    async fn record_exists(&self, record: &ConsumptionRecord) -> Result<bool, StoreError> {
        self.ensure_available()?;
        Ok(self.contents.read().await.contains_record(record))
    }

    async fn record_consumption(&self, record: ConsumptionRecord) -> Result<(), StoreError> {
        self.ensure_available()?;
        let mut contents = self.contents.write().await;
        if contents.contains_record(&record) {
            return Err(StoreError::Rejected(format!(
                "duplicate consumption record '{}'",
                record.record_id()
            )));
        }
        if let Some(event_id) = record.event_id()
            && !contents.events.iter().any(|event| event.event_id == event_id)
        {
            return Err(StoreError::Rejected(format!(
                "consumption record '{}' references unknown event '{}'",
                record.record_id(),
                event_id
            )));
        }

        match record {
            ConsumptionRecord::Fulfillment(row) => contents.fulfillments.push(row),
            ConsumptionRecord::TicketClaim(row) => contents.ticket_claims.push(row),
            ConsumptionRecord::SymposiumRegistration(row) => {
                contents.symposium_registrations.push(row)
            }
            ConsumptionRecord::VipDinnerRsvp(row) => contents.vip_dinner_rsvps.push(row),
        }
        Ok(())
    }
}
