use std::collections::BTreeMap;

use entitlements::{
    allocation::evaluate_allocations,
    catalog::{AllocationField, Catalog, EventAllocation},
    consumption::{EventConsumption, TicketType},
    overrides::{
        AllocationFieldOverride, OrganizationAllocationOverride, OverrideMode, OverrideStore,
    },
};

use crate::fixtures::{ORG, OTHER_ORG, SUMMIT, TIER, ctx, event, ticket};

const GALA: &str = "gala-2024";

fn catalog() -> Catalog {
    Catalog::new(
        Vec::new(),
        Vec::new(),
        vec![event(SUMMIT), event(GALA)],
        vec![EventAllocation {
            tier_id: TIER.to_string(),
            event_id: SUMMIT.to_string(),
            general_tickets: Some(2),
            symposium_seats: Some(1),
            vip_dinner_seats: Some(0),
            ..EventAllocation::default()
        }],
    )
}

fn allocation_override(
    event_id: &str,
    fields: Vec<(AllocationField, Option<i64>)>,
) -> OrganizationAllocationOverride {
    OrganizationAllocationOverride {
        override_id: format!("alloc-ovr-{event_id}"),
        organization_id: ORG.to_string(),
        event_id: event_id.to_string(),
        override_mode: OverrideMode::Absolute,
        fields: fields
            .into_iter()
            .map(|(field, quantity)| {
                (
                    field,
                    AllocationFieldOverride {
                        quantity,
                        is_unlimited: false,
                    },
                )
            })
            .collect(),
        period_year: None,
        notes: None,
        updated_at: None,
    }
}

#[test]
fn given_tier_allocation_and_claims_when_evaluating_then_own_claims_reduce_remaining() {
    let mut consumption = BTreeMap::new();
    consumption.insert(
        SUMMIT.to_string(),
        EventConsumption {
            ticket_claims: vec![
                ticket("t-1", ORG, SUMMIT, TicketType::General),
                ticket("t-2", OTHER_ORG, SUMMIT, TicketType::General),
            ],
            ..EventConsumption::default()
        },
    );

    let report = evaluate_allocations(&ctx(2024), &catalog(), &OverrideStore::default(), &consumption);
    let summit = report.event(SUMMIT).expect("summit should be listed");

    let general = summit
        .field(AllocationField::GeneralTickets)
        .expect("general tickets are allocated");
    assert_eq!(general.base_quantity, Some(2));
    assert_eq!(general.balance.fulfilled, 1);
    assert_eq!(general.balance.remaining, 1);

    assert!(summit.field(AllocationField::SymposiumSeats).is_some());
    assert!(
        summit.field(AllocationField::VipDinnerSeats).is_none(),
        "zero field without override is hidden"
    );
    assert!(summit.field(AllocationField::ProTickets).is_none());
    assert!(!summit.has_override);
    assert_eq!(summit.ticket_claims.len(), 1);
    assert!(report.event(GALA).is_none(), "no allocation and no override");
}

#[test]
fn given_field_override_when_evaluating_then_field_appears_and_event_is_flagged() {
    let overrides = OverrideStore::new(
        Vec::new(),
        vec![allocation_override(
            SUMMIT,
            vec![(AllocationField::VipDinnerSeats, Some(2))],
        )],
    );

    let report = evaluate_allocations(&ctx(2024), &catalog(), &overrides, &BTreeMap::new());
    let summit = report.event(SUMMIT).expect("summit should be listed");

    let vip = summit
        .field(AllocationField::VipDinnerSeats)
        .expect("override makes the field visible");
    assert_eq!(vip.balance.entitled, 2);
    assert!(vip.has_override);
    assert!(summit.has_override);

    let general = summit
        .field(AllocationField::GeneralTickets)
        .expect("general tickets keep the tier default");
    assert!(!general.has_override);
    assert_eq!(general.balance.entitled, 2);
}

#[test]
fn given_override_on_event_without_tier_allocation_when_evaluating_then_event_is_listed() {
    let overrides = OverrideStore::new(
        Vec::new(),
        vec![allocation_override(
            GALA,
            vec![(AllocationField::WhaleTickets, Some(1))],
        )],
    );

    let report = evaluate_allocations(&ctx(2024), &catalog(), &overrides, &BTreeMap::new());
    let gala = report.event(GALA).expect("override makes the gala visible");
    assert_eq!(gala.fields.len(), 1);
    assert_eq!(gala.fields[0].field, AllocationField::WhaleTickets);
    assert_eq!(gala.fields[0].balance.remaining, 1);
}

#[test]
fn given_consumption_for_unknown_event_when_evaluating_then_it_is_counted_as_orphan() {
    let mut consumption = BTreeMap::new();
    consumption.insert(
        "cancelled-expo".to_string(),
        EventConsumption {
            ticket_claims: vec![ticket("t-1", ORG, "cancelled-expo", TicketType::Pro)],
            ..EventConsumption::default()
        },
    );
    let overrides = OverrideStore::new(
        Vec::new(),
        vec![allocation_override(
            "cancelled-expo",
            vec![(AllocationField::ProTickets, Some(1))],
        )],
    );

    let report = evaluate_allocations(&ctx(2024), &catalog(), &overrides, &consumption);
    assert!(report.event("cancelled-expo").is_none());
    assert_eq!(report.skipped_orphans, 1);
}

#[test]
fn given_year_scoped_allocation_override_when_evaluating_then_it_beats_evergreen_only_in_its_year() {
    let evergreen = allocation_override(SUMMIT, vec![(AllocationField::GeneralTickets, Some(4))]);
    let scoped = OrganizationAllocationOverride {
        override_id: "alloc-ovr-2025".to_string(),
        period_year: Some(2025),
        ..allocation_override(SUMMIT, vec![(AllocationField::GeneralTickets, Some(7))])
    };
    let overrides = OverrideStore::new(Vec::new(), vec![evergreen, scoped]);

    let general_in = |year| {
        evaluate_allocations(&ctx(year), &catalog(), &overrides, &BTreeMap::new())
            .event(SUMMIT)
            .and_then(|view| view.field(AllocationField::GeneralTickets))
            .map(|field| field.balance.entitled)
    };
    assert_eq!(general_in(2025), Some(7));
    assert_eq!(general_in(2024), Some(4));
}

#[test]
fn given_override_without_field_adjustments_when_evaluating_then_event_stays_hidden() {
    let overrides = OverrideStore::new(Vec::new(), vec![allocation_override(GALA, Vec::new())]);

    let report = evaluate_allocations(&ctx(2024), &catalog(), &overrides, &BTreeMap::new());
    assert!(report.event(GALA).is_none());
}
