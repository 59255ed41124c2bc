use serde::{Deserialize, Serialize};

use crate::{
    catalog::{AllocationField, EventAllocation, PackageBenefit},
    overrides::{
        OrganizationAllocationOverride, OrganizationBenefitOverride, OverrideMode,
        QuantityOverride,
    },
    types::{PeriodYear, UNLIMITED},
};

/// Effective entitled quantity after merging a default with an override.
/// `quantity` is never negative except for the unlimited sentinel `-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub quantity: i64,
    pub is_unlimited: bool,
}

impl Entitlement {
    pub fn unlimited() -> Self {
        Self {
            quantity: UNLIMITED,
            is_unlimited: true,
        }
    }

    pub fn limited(quantity: i64) -> Self {
        Self {
            quantity: quantity.max(0),
            is_unlimited: false,
        }
    }

    pub fn is_zero(&self) -> bool {
        !self.is_unlimited && self.quantity == 0
    }

    /// For non-quantifiable benefits: granted at all.
    pub fn is_included(&self) -> bool {
        self.is_unlimited || self.quantity > 0
    }
}

pub fn resolve_entitlement(
    base_quantity: Option<i64>,
    base_unlimited: bool,
    quantity_override: Option<&QuantityOverride>,
) -> Entitlement {
    let mut effective = base_quantity.unwrap_or(0);

    if let Some(quantity_override) = quantity_override {
        if quantity_override.is_unlimited {
            return Entitlement::unlimited();
        }

        match quantity_override.mode {
            // A null absolute quantity leaves the default untouched.
            OverrideMode::Absolute => {
                effective = quantity_override.quantity.unwrap_or(effective);
            }
            OverrideMode::Additive => {
                effective = effective.saturating_add(quantity_override.quantity.unwrap_or(0));
            }
        }
    }

    if base_unlimited {
        return Entitlement::unlimited();
    }

    Entitlement::limited(effective)
}

/// Resolves one benefit for `target_year`. An override scoped to another year
/// is ignored.
pub fn resolve_benefit(
    package_benefit: Option<&PackageBenefit>,
    benefit_override: Option<&OrganizationBenefitOverride>,
    target_year: PeriodYear,
) -> Entitlement {
    let quantity_override = benefit_override
        .filter(|row| row.applies_to_year(target_year))
        .map(OrganizationBenefitOverride::quantity_override);

    resolve_entitlement(
        package_benefit.and_then(|link| link.quantity),
        package_benefit.is_some_and(|link| link.is_unlimited),
        quantity_override.as_ref(),
    )
}

pub fn resolve_allocation_field(
    allocation: Option<&EventAllocation>,
    allocation_override: Option<&OrganizationAllocationOverride>,
    field: AllocationField,
) -> Entitlement {
    let quantity_override = allocation_override.and_then(|row| row.field(field));

    resolve_entitlement(
        allocation.and_then(|row| row.quantity(field)),
        false,
        quantity_override.as_ref(),
    )
}
