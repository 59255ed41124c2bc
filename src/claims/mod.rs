pub mod coordinator;
pub mod ledger;
pub mod types;

use sha2::{Digest, Sha256};

pub use coordinator::{ClaimCoordinator, ReservationTicket};
pub use ledger::ClaimLedger;
pub use types::{
    Attendee, ClaimEntry, ClaimEntryKind, ClaimKey, ClaimReceipt, ClaimRequest, ClaimTarget,
    FulfillmentDraft, ReservationRecord, ReservationState,
};

/// Record id for a claim. The same idempotency key for the same target always
/// yields the same id, so a replayed claim is recognized as a duplicate.
pub fn derive_record_id(prefix: &str, key: &ClaimKey, idempotency_key: &str) -> String {
    let canonical = serde_json::json!({
        "organization_id": key.organization_id,
        "target": key.target,
        "idempotency_key": idempotency_key,
    });
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string().as_bytes());
    let digest = hasher.finalize();
    let hex = format!("{:x}", digest);
    format!("{}:{}", prefix, &hex[..24])
}
