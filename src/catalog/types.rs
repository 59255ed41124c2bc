use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{BenefitId, EventId, PackageId, PeriodYear, TierId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BenefitScope {
    Annual,
    OneTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenefitDefinition {
    pub benefit_id: BenefitId,
    pub label: String,
    #[serde(default)]
    pub category: Option<String>,
    /// `false` means the benefit is either included or not, never counted.
    #[serde(default = "default_quantifiable")]
    pub is_quantifiable: bool,
    pub scope: BenefitScope,
    #[serde(default)]
    pub unit_label: Option<String>,
}

fn default_quantifiable() -> bool {
    true
}

/// Tier-level default for one benefit inside a (tier x track) package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageBenefit {
    pub package_id: PackageId,
    pub benefit_id: BenefitId,
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub is_unlimited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    pub event_id: EventId,
    pub name: String,
    #[serde(default)]
    pub year: Option<PeriodYear>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationField {
    GeneralTickets,
    ProTickets,
    WhaleTickets,
    CustomTickets,
    SymposiumSeats,
    VipDinnerSeats,
}

impl AllocationField {
    pub const ALL: [AllocationField; 6] = [
        AllocationField::GeneralTickets,
        AllocationField::ProTickets,
        AllocationField::WhaleTickets,
        AllocationField::CustomTickets,
        AllocationField::SymposiumSeats,
        AllocationField::VipDinnerSeats,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationField::GeneralTickets => "general_tickets",
            AllocationField::ProTickets => "pro_tickets",
            AllocationField::WhaleTickets => "whale_tickets",
            AllocationField::CustomTickets => "custom_tickets",
            AllocationField::SymposiumSeats => "symposium_seats",
            AllocationField::VipDinnerSeats => "vip_dinner_seats",
        }
    }
}

impl fmt::Display for AllocationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-tier default quantities for one event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EventAllocation {
    pub tier_id: TierId,
    pub event_id: EventId,
    #[serde(default)]
    pub general_tickets: Option<i64>,
    #[serde(default)]
    pub pro_tickets: Option<i64>,
    #[serde(default)]
    pub whale_tickets: Option<i64>,
    #[serde(default)]
    pub custom_tickets: Option<i64>,
    #[serde(default)]
    pub symposium_seats: Option<i64>,
    #[serde(default)]
    pub vip_dinner_seats: Option<i64>,
}

impl EventAllocation {
    pub fn quantity(&self, field: AllocationField) -> Option<i64> {
        match field {
            AllocationField::GeneralTickets => self.general_tickets,
            AllocationField::ProTickets => self.pro_tickets,
            AllocationField::WhaleTickets => self.whale_tickets,
            AllocationField::CustomTickets => self.custom_tickets,
            AllocationField::SymposiumSeats => self.symposium_seats,
            AllocationField::VipDinnerSeats => self.vip_dinner_seats,
        }
    }
}
