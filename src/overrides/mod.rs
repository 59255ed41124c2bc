pub mod store;
pub mod types;

pub use store::OverrideStore;
pub use types::{
    AllocationFieldOverride, OrganizationAllocationOverride, OrganizationBenefitOverride,
    OverrideMode, QuantityOverride,
};
