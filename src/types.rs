use serde::{Deserialize, Serialize};

pub type OrganizationId = String;
pub type MemberId = String;
pub type TierId = String;
pub type PackageId = String;
pub type BenefitId = String;
pub type EventId = String;
pub type OverrideId = String;
pub type PeriodYear = i32;

/// Sentinel quantity reported for unlimited entitlements.
pub const UNLIMITED: i64 = -1;

/// Everything an evaluation needs to know about who is asking and for which
/// benefit-year. Passed explicitly into every resolver, ledger and balance call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub organization_id: OrganizationId,
    pub tier_id: TierId,
    /// Package for the organization's (tier x track). `None` means the
    /// organization has no package and only overrides can grant benefits.
    #[serde(default)]
    pub package_id: Option<PackageId>,
    pub target_year: PeriodYear,
}

impl EvaluationContext {
    pub fn new(
        organization_id: impl Into<OrganizationId>,
        tier_id: impl Into<TierId>,
        package_id: Option<PackageId>,
        target_year: PeriodYear,
    ) -> Self {
        Self {
            organization_id: organization_id.into(),
            tier_id: tier_id.into(),
            package_id,
            target_year,
        }
    }
}
