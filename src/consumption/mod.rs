pub mod aggregate;
pub mod types;

pub use aggregate::{
    AllocationConsumption, ConsumptionSummary, aggregate_allocation_consumption,
    aggregate_consumption, in_scope,
};
pub use types::{
    Consumption, ConsumptionRecord, ConsumptionStatus, EventConsumption, Fulfillment,
    SpeakerApplication, SpeakerApplicationStatus, SymposiumRegistration, TicketClaim, TicketType,
    VipDinnerRsvp,
};
