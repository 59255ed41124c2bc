use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    catalog::{AllocationField, BenefitDefinition, BenefitScope},
    consumption::types::{Consumption, ConsumptionStatus, EventConsumption, TicketClaim},
    types::PeriodYear,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    /// Sum of completed quantities in scope.
    pub fulfilled_quantity: i64,
    /// Pending work only; never reduces the balance.
    pub scheduled_count: usize,
}

/// Whether a record counts toward `benefit` in `target_year`. One-time
/// benefits accumulate across every year.
pub fn in_scope(
    benefit: &BenefitDefinition,
    period_year: Option<PeriodYear>,
    target_year: PeriodYear,
) -> bool {
    match benefit.scope {
        BenefitScope::OneTime => true,
        BenefitScope::Annual => period_year == Some(target_year),
    }
}

pub fn aggregate_consumption<'a, C, I>(
    records: I,
    benefit: &BenefitDefinition,
    target_year: PeriodYear,
) -> ConsumptionSummary
where
    C: Consumption + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let mut summary = ConsumptionSummary::default();

    for record in records {
        if record.benefit_id() != Some(benefit.benefit_id.as_str()) {
            continue;
        }
        if !in_scope(benefit, record.period_year(), target_year) {
            continue;
        }

        match record.status() {
            ConsumptionStatus::Completed => {
                summary.fulfilled_quantity = summary
                    .fulfilled_quantity
                    .saturating_add(record.quantity().max(0));
            }
            ConsumptionStatus::Scheduled => summary.scheduled_count += 1,
            ConsumptionStatus::Cancelled | ConsumptionStatus::Other => {}
        }
    }

    summary
}

/// Claimed units per allocation field for one event. Each row is one unit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocationConsumption {
    counts: BTreeMap<AllocationField, i64>,
}

impl AllocationConsumption {
    pub fn count(&self, field: AllocationField) -> i64 {
        self.counts.get(&field).copied().unwrap_or(0)
    }

    fn add(&mut self, field: AllocationField) {
        *self.counts.entry(field).or_insert(0) += 1;
    }
}

pub fn aggregate_allocation_consumption(
    event_id: &str,
    consumption: &EventConsumption,
) -> AllocationConsumption {
    let mut aggregated = AllocationConsumption::default();

    let tickets = consumption
        .ticket_claims
        .iter()
        .filter(|claim| claim.event_id == event_id)
        .map(|claim: &TicketClaim| claim.ticket_type.allocation_field());
    for field in tickets {
        aggregated.add(field);
    }

    for _ in consumption
        .symposium_registrations
        .iter()
        .filter(|row| row.event_id == event_id)
    {
        aggregated.add(AllocationField::SymposiumSeats);
    }

    for _ in consumption
        .vip_dinner_rsvps
        .iter()
        .filter(|row| row.event_id == event_id)
    {
        aggregated.add(AllocationField::VipDinnerSeats);
    }

    aggregated
}
