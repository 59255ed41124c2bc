use std::future::Future;

use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;

use crate::{
    balance::Balance,
    claims::{ledger::ClaimLedger, types::ClaimKey},
    config::{ClaimsConfig, DEFAULT_RESERVATION_TTL_SECONDS},
    error::EntitlementError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationTicket {
    pub reservation_id: String,
    pub key: ClaimKey,
    pub units: i64,
    pub balance_before: Balance,
}

/// Serializes the check-and-reserve step of every guarded claim in this
/// process. The record insert itself runs outside the lock; held reservations
/// keep concurrent claims from spending the same units meanwhile.
///
/// A reservation expires only while its claim has not started writing. After
/// `begin_insert` the units stay held however long the write takes, so a slow
/// store cannot hand them out twice. Between a record insert and its
/// settlement the same units are visible both as consumption and as a held
/// reservation, so a concurrent claim may be rejected early but never
/// overdraws. A claim task dropped mid-write keeps its units held until the
/// process restarts, since the write may or may not have landed.
///
/// The guard is process-local. Several processes writing to one backend still
/// need a conditional insert on the storage side.
#[derive(Debug)]
pub struct ClaimCoordinator {
    ledger: Mutex<ClaimLedger>,
    guarded: bool,
    reservation_ttl: Duration,
}

impl ClaimCoordinator {
    pub fn new(guarded: bool, reservation_ttl: Duration) -> Self {
        Self {
            ledger: Mutex::new(ClaimLedger::new()),
            guarded,
            reservation_ttl,
        }
    }

    pub fn from_config(config: &ClaimsConfig) -> anyhow::Result<Self> {
        Ok(Self::new(config.guarded, config.reservation_ttl()?))
    }

    pub fn is_guarded(&self) -> bool {
        self.guarded
    }

    /// Runs `read_balance` under the lock, then reserves `units` against the
    /// balance it returns minus already-held reservations.
    pub async fn reserve<F, Fut>(
        &self,
        key: ClaimKey,
        units: i64,
        reference_id: String,
        read_balance: F,
    ) -> Result<ReservationTicket, EntitlementError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Balance, EntitlementError>>,
    {
        let mut ledger = self.ledger.lock().await;
        let now = OffsetDateTime::now_utc();

        let expired = ledger.expire_open_reservations(now)?;
        if !expired.is_empty() {
            tracing::warn!(
                target: "claims",
                expired = expired.len(),
                "stale_reservations_expired"
            );
        }

        let balance_before = read_balance().await?;
        let reservation_id = ledger.reserve(
            key.clone(),
            units,
            &balance_before,
            now,
            self.reservation_ttl,
            reference_id,
        )?;

        tracing::debug!(
            target: "claims",
            reservation_id = %reservation_id,
            organization_id = %key.organization_id,
            units = units,
            remaining = balance_before.remaining,
            "claim_reserved"
        );

        Ok(ReservationTicket {
            reservation_id,
            key,
            units,
            balance_before,
        })
    }

    /// Must be called right before the record write. Fails if the reservation
    /// expired first; nothing may be written then.
    pub async fn begin_insert(&self, ticket: &ReservationTicket) -> Result<(), EntitlementError> {
        self.ledger
            .lock()
            .await
            .begin_insert(&ticket.reservation_id, OffsetDateTime::now_utc())
    }

    pub async fn settle(
        &self,
        ticket: &ReservationTicket,
        reference_id: &str,
    ) -> Result<(), EntitlementError> {
        self.ledger.lock().await.settle_reservation(
            &ticket.reservation_id,
            reference_id,
            OffsetDateTime::now_utc(),
        )
    }

    pub async fn refund(
        &self,
        ticket: &ReservationTicket,
        reference_id: &str,
    ) -> Result<(), EntitlementError> {
        self.ledger.lock().await.refund_reservation(
            &ticket.reservation_id,
            reference_id,
            OffsetDateTime::now_utc(),
        )
    }

    pub async fn record_unguarded(
        &self,
        key: ClaimKey,
        units: i64,
        record_id: String,
    ) -> Result<(), EntitlementError> {
        self.ledger
            .lock()
            .await
            .record_unguarded(key, units, record_id, OffsetDateTime::now_utc())
    }

    pub async fn ledger_snapshot(&self) -> ClaimLedger {
        self.ledger.lock().await.clone()
    }
}

impl Default for ClaimCoordinator {
    fn default() -> Self {
        Self::new(
            true,
            Duration::seconds(DEFAULT_RESERVATION_TTL_SECONDS as i64),
        )
    }
}
