use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    balance::Balance,
    catalog::AllocationField,
    consumption::{ConsumptionStatus, TicketType},
    types::{BenefitId, EventId, MemberId, OrganizationId, PeriodYear},
};

/// What a claim draws from. Benefit targets carry the benefit-year the claim
/// counts toward (`None` for one-time benefits).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimTarget {
    Benefit {
        benefit_id: BenefitId,
        period_year: Option<PeriodYear>,
    },
    Allocation {
        event_id: EventId,
        field: AllocationField,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClaimKey {
    pub organization_id: OrganizationId,
    pub target: ClaimTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationState {
    Open,
    /// The record write has started; the reservation no longer expires.
    Inserting,
    Settled,
    Refunded,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub reservation_id: String,
    pub key: ClaimKey,
    pub units: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub state: ReservationState,
    #[serde(default)]
    pub terminal_reference_id: Option<String>,
}

impl ReservationState {
    /// Units of a held reservation still count against the balance.
    pub fn is_held(self) -> bool {
        matches!(self, ReservationState::Open | ReservationState::Inserting)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClaimEntryKind {
    Reserve { reservation_id: String },
    Insert { reservation_id: String },
    Settle { reservation_id: String },
    Refund { reservation_id: String },
    Expire { reservation_id: String },
    Unguarded { record_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimEntry {
    pub entry_id: String,
    pub seq_no: u64,
    pub kind: ClaimEntryKind,
    pub key: ClaimKey,
    pub units: i64,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Attendee {
    #[serde(default)]
    pub member_id: Option<MemberId>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[serde(default)]
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct FulfillmentDraft {
    #[validate(length(min = 1))]
    pub benefit_id: BenefitId,
    #[validate(range(min = 1))]
    pub quantity: i64,
    pub status: ConsumptionStatus,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    #[validate(url)]
    pub proof_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimRequest {
    Fulfillment(FulfillmentDraft),
    Ticket {
        event_id: EventId,
        ticket_type: TicketType,
        attendee: Attendee,
    },
    SymposiumSeat {
        event_id: EventId,
        attendee: Attendee,
    },
    VipDinnerSeat {
        event_id: EventId,
        attendee: Attendee,
    },
}

impl ClaimRequest {
    pub fn event_id(&self) -> Option<&str> {
        match self {
            ClaimRequest::Fulfillment(_) => None,
            ClaimRequest::Ticket { event_id, .. }
            | ClaimRequest::SymposiumSeat { event_id, .. }
            | ClaimRequest::VipDinnerSeat { event_id, .. } => Some(event_id),
        }
    }

    pub fn allocation_field(&self) -> Option<AllocationField> {
        match self {
            ClaimRequest::Fulfillment(_) => None,
            ClaimRequest::Ticket { ticket_type, .. } => Some(ticket_type.allocation_field()),
            ClaimRequest::SymposiumSeat { .. } => Some(AllocationField::SymposiumSeats),
            ClaimRequest::VipDinnerSeat { .. } => Some(AllocationField::VipDinnerSeats),
        }
    }

    pub fn units(&self) -> i64 {
        match self {
            ClaimRequest::Fulfillment(draft) => draft.quantity,
            _ => 1,
        }
    }

    /// Scheduled fulfillments never consume balance, so they skip the guard.
    pub fn consumes_balance(&self) -> bool {
        match self {
            ClaimRequest::Fulfillment(draft) => draft.status == ConsumptionStatus::Completed,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub record_id: String,
    pub key: ClaimKey,
    pub units: i64,
    #[serde(default)]
    pub reservation_id: Option<String>,
    /// Balance observed under the guard, before this claim was recorded.
    #[serde(default)]
    pub balance_before: Option<Balance>,
}
