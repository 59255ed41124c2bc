use std::collections::BTreeMap;

use entitlements::{
    catalog::{AllocationField, EventAllocation},
    overrides::{AllocationFieldOverride, OrganizationAllocationOverride, OverrideMode, QuantityOverride},
    resolver::{Entitlement, resolve_allocation_field, resolve_benefit, resolve_entitlement},
    types::UNLIMITED,
};

use crate::fixtures::{ORG, SUMMIT, TIER, benefit_override, link, unlimited_link};

#[test]
fn given_absolute_override_when_resolving_then_non_null_quantity_replaces_base() {
    for base in [0, 1, 4] {
        for quantity in [0, 2, 7] {
            let resolved = resolve_entitlement(
                Some(base),
                false,
                Some(&QuantityOverride::absolute(Some(quantity))),
            );
            assert_eq!(resolved, Entitlement::limited(quantity));
        }

        let untouched =
            resolve_entitlement(Some(base), false, Some(&QuantityOverride::absolute(None)));
        assert_eq!(untouched.quantity, base, "null absolute override is a no-op");
    }
}

#[test]
fn given_additive_override_when_resolving_then_result_is_floored_at_zero() {
    for base in [0, 2, 5] {
        for delta in -6..=6 {
            let resolved = resolve_entitlement(
                Some(base),
                false,
                Some(&QuantityOverride::additive(Some(delta))),
            );
            assert_eq!(resolved.quantity, (base + delta).max(0));
            assert!(!resolved.is_unlimited);
        }
    }
}

#[test]
fn given_unlimited_override_when_resolving_then_sentinel_is_reported_for_every_mode() {
    for mode in [OverrideMode::Absolute, OverrideMode::Additive] {
        let mut quantity_override = QuantityOverride::unlimited(mode);
        quantity_override.quantity = Some(3);

        let resolved = resolve_entitlement(Some(1), false, Some(&quantity_override));
        assert!(resolved.is_unlimited);
        assert_eq!(resolved.quantity, UNLIMITED);
    }
}

#[test]
fn given_base_two_and_additive_minus_one_for_target_year_when_resolving_benefit_then_one_is_entitled() {
    let package_link = link("speaking-slot", Some(2));
    let row = benefit_override(
        "ovr-1",
        "speaking-slot",
        OverrideMode::Additive,
        Some(-1),
        Some(2024),
    );

    let resolved = resolve_benefit(Some(&package_link), Some(&row), 2024);
    assert_eq!(resolved, Entitlement::limited(1));
}

#[test]
fn given_override_for_another_year_when_resolving_benefit_then_base_is_kept() {
    let package_link = link("speaking-slot", Some(2));
    let row = benefit_override(
        "ovr-1",
        "speaking-slot",
        OverrideMode::Absolute,
        Some(9),
        Some(2023),
    );

    let resolved = resolve_benefit(Some(&package_link), Some(&row), 2024);
    assert_eq!(resolved, Entitlement::limited(2));
}

#[test]
fn given_unlimited_package_link_when_absolute_override_applies_then_benefit_stays_unlimited() {
    let package_link = unlimited_link("newsletter-mention");
    let row = benefit_override(
        "ovr-1",
        "newsletter-mention",
        OverrideMode::Absolute,
        Some(1),
        None,
    );

    let resolved = resolve_benefit(Some(&package_link), Some(&row), 2024);
    assert!(resolved.is_unlimited);
}

#[test]
fn given_field_level_override_when_resolving_allocation_then_only_that_field_changes() {
    let allocation = EventAllocation {
        tier_id: TIER.to_string(),
        event_id: SUMMIT.to_string(),
        general_tickets: Some(2),
        pro_tickets: Some(1),
        ..EventAllocation::default()
    };
    let mut fields = BTreeMap::new();
    fields.insert(
        AllocationField::GeneralTickets,
        AllocationFieldOverride {
            quantity: Some(3),
            is_unlimited: false,
        },
    );
    fields.insert(
        AllocationField::VipDinnerSeats,
        AllocationFieldOverride {
            quantity: None,
            is_unlimited: true,
        },
    );
    let row = OrganizationAllocationOverride {
        override_id: "alloc-ovr-1".to_string(),
        organization_id: ORG.to_string(),
        event_id: SUMMIT.to_string(),
        override_mode: OverrideMode::Additive,
        fields,
        period_year: None,
        notes: None,
        updated_at: None,
    };

    let general =
        resolve_allocation_field(Some(&allocation), Some(&row), AllocationField::GeneralTickets);
    let pro = resolve_allocation_field(Some(&allocation), Some(&row), AllocationField::ProTickets);
    let vip =
        resolve_allocation_field(Some(&allocation), Some(&row), AllocationField::VipDinnerSeats);
    let whale = resolve_allocation_field(None, Some(&row), AllocationField::WhaleTickets);

    assert_eq!(general, Entitlement::limited(5));
    assert_eq!(pro, Entitlement::limited(1));
    assert_eq!(vip, Entitlement::unlimited());
    assert!(whale.is_zero());
}
