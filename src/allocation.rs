use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
    balance::{Balance, compute_balance},
    catalog::{AllocationField, Catalog, EventDefinition},
    consumption::{
        EventConsumption, SpeakerApplication, SymposiumRegistration, TicketClaim, VipDinnerRsvp,
        aggregate_allocation_consumption,
    },
    overrides::OverrideStore,
    resolver::{Entitlement, resolve_allocation_field},
    types::{EvaluationContext, EventId, OrganizationId, TierId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationFieldBalance {
    pub field: AllocationField,
    #[serde(default)]
    pub base_quantity: Option<i64>,
    pub entitlement: Entitlement,
    #[serde(flatten)]
    pub balance: Balance,
    pub has_override: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAllocationView {
    pub event: EventDefinition,
    /// Display hint: some field of this event carries an override.
    pub has_override: bool,
    pub fields: Vec<AllocationFieldBalance>,
    pub ticket_claims: Vec<TicketClaim>,
    pub symposium_registrations: Vec<SymposiumRegistration>,
    pub vip_dinner_rsvps: Vec<VipDinnerRsvp>,
    pub speaker_applications: Vec<SpeakerApplication>,
}

impl EventAllocationView {
    pub fn field(&self, field: AllocationField) -> Option<&AllocationFieldBalance> {
        self.fields.iter().find(|row| row.field == field)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationReport {
    pub organization_id: OrganizationId,
    pub tier_id: TierId,
    pub events: Vec<EventAllocationView>,
    pub skipped_orphans: usize,
}

impl AllocationReport {
    pub fn event(&self, event_id: &str) -> Option<&EventAllocationView> {
        self.events
            .iter()
            .find(|view| view.event.event_id == event_id)
    }
}

/// Events with a tier allocation row or an organization override.
pub fn candidate_events(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
) -> BTreeSet<EventId> {
    let mut events: BTreeSet<EventId> = catalog
        .allocations_for_tier(&ctx.tier_id)
        .map(|row| row.event_id.clone())
        .collect();
    events.extend(overrides.overridden_events(&ctx.organization_id, ctx.target_year));
    events
}

pub fn evaluate_field(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
    event_id: &str,
    field: AllocationField,
    consumed: i64,
) -> AllocationFieldBalance {
    let allocation = catalog.allocation(&ctx.tier_id, event_id);
    let allocation_override =
        overrides.allocation_override(&ctx.organization_id, event_id, ctx.target_year);
    let entitlement = resolve_allocation_field(allocation, allocation_override, field);

    AllocationFieldBalance {
        field,
        base_quantity: allocation.and_then(|row| row.quantity(field)),
        entitlement,
        balance: compute_balance(&entitlement, consumed),
        has_override: allocation_override.is_some_and(|row| row.field(field).is_some()),
    }
}

fn owned_by(consumption: &EventConsumption, organization_id: &str) -> EventConsumption {
    EventConsumption {
        ticket_claims: consumption
            .ticket_claims
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .cloned()
            .collect(),
        symposium_registrations: consumption
            .symposium_registrations
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .cloned()
            .collect(),
        vip_dinner_rsvps: consumption
            .vip_dinner_rsvps
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .cloned()
            .collect(),
        speaker_applications: consumption
            .speaker_applications
            .iter()
            .filter(|row| row.organization_id == organization_id)
            .cloned()
            .collect(),
    }
}

pub fn evaluate_event(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
    event: &EventDefinition,
    consumption: &EventConsumption,
) -> Option<EventAllocationView> {
    let own = owned_by(consumption, &ctx.organization_id);
    let consumed = aggregate_allocation_consumption(&event.event_id, &own);

    let fields: Vec<AllocationFieldBalance> = AllocationField::ALL
        .into_iter()
        .map(|field| {
            evaluate_field(
                ctx,
                catalog,
                overrides,
                &event.event_id,
                field,
                consumed.count(field),
            )
        })
        .filter(|row| !(row.entitlement.is_zero() && !row.has_override))
        .collect();

    if fields.is_empty() {
        return None;
    }

    Some(EventAllocationView {
        event: event.clone(),
        has_override: fields.iter().any(|row| row.has_override),
        fields,
        ticket_claims: own.ticket_claims,
        symposium_registrations: own.symposium_registrations,
        vip_dinner_rsvps: own.vip_dinner_rsvps,
        speaker_applications: own.speaker_applications,
    })
}

pub fn evaluate_allocations(
    ctx: &EvaluationContext,
    catalog: &Catalog,
    overrides: &OverrideStore,
    consumption: &BTreeMap<EventId, EventConsumption>,
) -> AllocationReport {
    let empty = EventConsumption::default();
    let mut events = Vec::new();

    for event_id in candidate_events(ctx, catalog, overrides) {
        let Some(event) = catalog.event(&event_id) else {
            tracing::warn!(
                target: "entitlements",
                organization_id = %ctx.organization_id,
                event_id = %event_id,
                "orphaned_allocation_skipped"
            );
            continue;
        };

        let recorded = consumption.get(&event_id).unwrap_or(&empty);
        if let Some(view) = evaluate_event(ctx, catalog, overrides, event, recorded) {
            events.push(view);
        }
    }

    let skipped_orphans: usize = consumption
        .iter()
        .filter(|(event_id, _)| catalog.event(event_id).is_none())
        .map(|(_, recorded)| {
            recorded.ticket_claims.len()
                + recorded.symposium_registrations.len()
                + recorded.vip_dinner_rsvps.len()
        })
        .sum();
    if skipped_orphans > 0 {
        tracing::warn!(
            target: "entitlements",
            organization_id = %ctx.organization_id,
            skipped = skipped_orphans,
            "orphaned_consumption_skipped"
        );
    }

    AllocationReport {
        organization_id: ctx.organization_id.clone(),
        tier_id: ctx.tier_id.clone(),
        events,
        skipped_orphans,
    }
}
