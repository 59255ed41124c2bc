use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    catalog::AllocationField,
    types::{BenefitId, EventId, MemberId, OrganizationId, PeriodYear},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumptionStatus {
    Scheduled,
    Completed,
    Cancelled,
    /// Any other terminal state recorded by the application.
    #[serde(other)]
    Other,
}

/// Shape shared by every consumption record kind.
pub trait Consumption {
    fn organization_id(&self) -> &str;
    fn status(&self) -> ConsumptionStatus;
    fn quantity(&self) -> i64;
    fn period_year(&self) -> Option<PeriodYear>;

    fn benefit_id(&self) -> Option<&str> {
        None
    }
}

fn default_quantity() -> i64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub fulfillment_id: String,
    pub organization_id: OrganizationId,
    pub benefit_id: BenefitId,
    pub status: ConsumptionStatus,
    #[serde(default = "default_quantity")]
    pub quantity: i64,
    #[serde(default)]
    pub period_year: Option<PeriodYear>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub proof_url: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub scheduled_for: Option<OffsetDateTime>,
}

impl Consumption for Fulfillment {
    fn organization_id(&self) -> &str {
        &self.organization_id
    }

    fn status(&self) -> ConsumptionStatus {
        self.status
    }

    fn quantity(&self) -> i64 {
        self.quantity
    }

    fn period_year(&self) -> Option<PeriodYear> {
        self.period_year
    }

    fn benefit_id(&self) -> Option<&str> {
        Some(&self.benefit_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    General,
    Pro,
    Whale,
    Custom,
}

impl TicketType {
    pub fn allocation_field(&self) -> AllocationField {
        match self {
            TicketType::General => AllocationField::GeneralTickets,
            TicketType::Pro => AllocationField::ProTickets,
            TicketType::Whale => AllocationField::WhaleTickets,
            TicketType::Custom => AllocationField::CustomTickets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaim {
    pub claim_id: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub event_id: EventId,
    pub ticket_type: TicketType,
    pub attendee_name: String,
    #[serde(default)]
    pub attendee_email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub claimed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymposiumRegistration {
    pub registration_id: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub event_id: EventId,
    pub attendee_name: String,
    #[serde(default)]
    pub attendee_email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub registered_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VipDinnerRsvp {
    pub rsvp_id: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub event_id: EventId,
    pub attendee_name: String,
    #[serde(default)]
    pub attendee_email: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub responded_at: Option<OffsetDateTime>,
}

macro_rules! single_unit_consumption {
    ($($record:ty),+ $(,)?) => {
        $(
            impl Consumption for $record {
                fn organization_id(&self) -> &str {
                    &self.organization_id
                }

                fn status(&self) -> ConsumptionStatus {
                    ConsumptionStatus::Completed
                }

                fn quantity(&self) -> i64 {
                    1
                }

                fn period_year(&self) -> Option<PeriodYear> {
                    None
                }
            }
        )+
    };
}

single_unit_consumption!(TicketClaim, SymposiumRegistration, VipDinnerRsvp);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerApplicationStatus {
    Submitted,
    Accepted,
    Rejected,
    Withdrawn,
}

/// Tracked for display only; speaking slots are not quantity-limited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakerApplication {
    pub application_id: String,
    pub organization_id: OrganizationId,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub event_id: EventId,
    pub talk_title: String,
    pub status: SpeakerApplicationStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsumptionRecord {
    Fulfillment(Fulfillment),
    TicketClaim(TicketClaim),
    SymposiumRegistration(SymposiumRegistration),
    VipDinnerRsvp(VipDinnerRsvp),
}

impl ConsumptionRecord {
    fn inner(&self) -> &dyn Consumption {
        match self {
            ConsumptionRecord::Fulfillment(record) => record,
            ConsumptionRecord::TicketClaim(record) => record,
            ConsumptionRecord::SymposiumRegistration(record) => record,
            ConsumptionRecord::VipDinnerRsvp(record) => record,
        }
    }

    pub fn event_id(&self) -> Option<&str> {
        match self {
            ConsumptionRecord::Fulfillment(_) => None,
            ConsumptionRecord::TicketClaim(record) => Some(&record.event_id),
            ConsumptionRecord::SymposiumRegistration(record) => Some(&record.event_id),
            ConsumptionRecord::VipDinnerRsvp(record) => Some(&record.event_id),
        }
    }

    pub fn allocation_field(&self) -> Option<AllocationField> {
        match self {
            ConsumptionRecord::Fulfillment(_) => None,
            ConsumptionRecord::TicketClaim(record) => Some(record.ticket_type.allocation_field()),
            ConsumptionRecord::SymposiumRegistration(_) => Some(AllocationField::SymposiumSeats),
            ConsumptionRecord::VipDinnerRsvp(_) => Some(AllocationField::VipDinnerSeats),
        }
    }

    pub fn record_id(&self) -> &str {
        match self {
            ConsumptionRecord::Fulfillment(record) => &record.fulfillment_id,
            ConsumptionRecord::TicketClaim(record) => &record.claim_id,
            ConsumptionRecord::SymposiumRegistration(record) => &record.registration_id,
            ConsumptionRecord::VipDinnerRsvp(record) => &record.rsvp_id,
        }
    }
}

impl Consumption for ConsumptionRecord {
    fn organization_id(&self) -> &str {
        self.inner().organization_id()
    }

    fn status(&self) -> ConsumptionStatus {
        self.inner().status()
    }

    fn quantity(&self) -> i64 {
        self.inner().quantity()
    }

    fn period_year(&self) -> Option<PeriodYear> {
        self.inner().period_year()
    }

    fn benefit_id(&self) -> Option<&str> {
        self.inner().benefit_id()
    }
}

/// Everything recorded for one (organization, event) pair.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventConsumption {
    #[serde(default)]
    pub ticket_claims: Vec<TicketClaim>,
    #[serde(default)]
    pub symposium_registrations: Vec<SymposiumRegistration>,
    #[serde(default)]
    pub vip_dinner_rsvps: Vec<VipDinnerRsvp>,
    #[serde(default)]
    pub speaker_applications: Vec<SpeakerApplication>,
}

impl EventConsumption {
    pub fn is_empty(&self) -> bool {
        self.ticket_claims.is_empty()
            && self.symposium_registrations.is_empty()
            && self.vip_dinner_rsvps.is_empty()
            && self.speaker_applications.is_empty()
    }
}
