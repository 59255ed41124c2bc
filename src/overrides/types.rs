use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{
    catalog::AllocationField,
    types::{BenefitId, EventId, OrganizationId, OverrideId, PeriodYear},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideMode {
    /// Replace the default quantity.
    #[default]
    Absolute,
    /// Add (possibly negative) units on top of the default quantity.
    Additive,
}

/// One override value as seen by the resolver, detached from the row it came
/// from so it can be applied per benefit or per allocation field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantityOverride {
    pub mode: OverrideMode,
    pub quantity: Option<i64>,
    pub is_unlimited: bool,
}

impl QuantityOverride {
    pub fn absolute(quantity: Option<i64>) -> Self {
        Self {
            mode: OverrideMode::Absolute,
            quantity,
            is_unlimited: false,
        }
    }

    pub fn additive(delta: Option<i64>) -> Self {
        Self {
            mode: OverrideMode::Additive,
            quantity: delta,
            is_unlimited: false,
        }
    }

    pub fn unlimited(mode: OverrideMode) -> Self {
        Self {
            mode,
            quantity: None,
            is_unlimited: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationBenefitOverride {
    pub override_id: OverrideId,
    pub organization_id: OrganizationId,
    pub benefit_id: BenefitId,
    #[serde(default)]
    pub override_mode: OverrideMode,
    #[serde(default)]
    pub quantity_override: Option<i64>,
    #[serde(default)]
    pub is_unlimited_override: bool,
    /// `None` applies to every year.
    #[serde(default)]
    pub period_year: Option<PeriodYear>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl OrganizationBenefitOverride {
    pub fn quantity_override(&self) -> QuantityOverride {
        if self.is_unlimited_override {
            return QuantityOverride::unlimited(self.override_mode);
        }
        QuantityOverride {
            mode: self.override_mode,
            quantity: self.quantity_override,
            is_unlimited: false,
        }
    }

    pub fn applies_to_year(&self, year: PeriodYear) -> bool {
        self.period_year.is_none_or(|period_year| period_year == year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AllocationFieldOverride {
    #[serde(default)]
    pub quantity: Option<i64>,
    #[serde(default)]
    pub is_unlimited: bool,
}

/// Organization override for one event. Fields missing from `fields` keep the
/// tier default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationAllocationOverride {
    pub override_id: OverrideId,
    pub organization_id: OrganizationId,
    pub event_id: EventId,
    #[serde(default)]
    pub override_mode: OverrideMode,
    #[serde(default)]
    pub fields: BTreeMap<AllocationField, AllocationFieldOverride>,
    /// `None` applies to every year.
    #[serde(default)]
    pub period_year: Option<PeriodYear>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub updated_at: Option<OffsetDateTime>,
}

impl OrganizationAllocationOverride {
    pub fn field(&self, field: AllocationField) -> Option<QuantityOverride> {
        let value = self.fields.get(&field)?;
        if value.is_unlimited {
            return Some(QuantityOverride::unlimited(self.override_mode));
        }
        Some(QuantityOverride {
            mode: self.override_mode,
            quantity: value.quantity,
            is_unlimited: false,
        })
    }

    pub fn has_field_overrides(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn applies_to_year(&self, year: PeriodYear) -> bool {
        self.period_year.is_none_or(|period_year| period_year == year)
    }
}
