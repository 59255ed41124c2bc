use std::collections::{BTreeMap, VecDeque};

use time::{Duration, OffsetDateTime};

use crate::{
    balance::Balance,
    claims::types::{ClaimEntry, ClaimEntryKind, ClaimKey, ReservationRecord, ReservationState},
    error::{
        EntitlementError, allocation_exhausted, arithmetic_error, invalid_request, ledger_conflict,
    },
};

/// Closed reservations and audit entries kept for replay and inspection.
pub const DEFAULT_HISTORY_LIMIT: usize = 1024;

/// Reservation book for guarded claims. Units stay held from the moment a
/// claim passes the balance check until its record is written (settle) or
/// abandoned (refund/expire).
///
/// Only `Open` reservations expire. Once a write has started
/// (`begin_insert`) the units stay held until the writer settles or refunds.
///
/// Held units are indexed per key. Closed reservations and audit entries are
/// kept up to `history_limit`, oldest dropped first; a terminal replay older
/// than that window reports an unknown reservation.
#[derive(Debug, Clone)]
pub struct ClaimLedger {
    next_sequence: u64,
    history_limit: usize,
    pub entries: VecDeque<ClaimEntry>,
    pub reservations: BTreeMap<String, ReservationRecord>,
    closed: VecDeque<String>,
    held_units: BTreeMap<ClaimKey, i64>,
}

impl Default for ClaimLedger {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl ClaimLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            next_sequence: 0,
            history_limit: history_limit.max(1),
            entries: VecDeque::new(),
            reservations: BTreeMap::new(),
            closed: VecDeque::new(),
            held_units: BTreeMap::new(),
        }
    }

    /// Units held by open or in-flight reservations for `key`.
    pub fn open_units(&self, key: &ClaimKey) -> i64 {
        self.held_units.get(key).copied().unwrap_or(0)
    }

    pub fn open_reservation_count(&self) -> usize {
        self.reservations.len().saturating_sub(self.closed.len())
    }

    /// Checks `balance` minus held units for `key` and reserves `units`.
    pub fn reserve(
        &mut self,
        key: ClaimKey,
        units: i64,
        balance: &Balance,
        now: OffsetDateTime,
        ttl: Duration,
        reference_id: String,
    ) -> Result<String, EntitlementError> {
        if units <= 0 {
            return Err(invalid_request("claimed units must be positive"));
        }

        let held = self.open_units(&key);
        if !balance.is_unlimited {
            let available = balance
                .remaining
                .checked_sub(held)
                .ok_or_else(|| arithmetic_error("available units underflow during reserve"))?
                .max(0);
            if available < units {
                return Err(allocation_exhausted(format!(
                    "insufficient balance for claim: required={}, available={}",
                    units, available
                )));
            }
        }

        let expires_at = now.checked_add(ttl).ok_or_else(|| {
            arithmetic_error(format!("reservation ttl {ttl:?} overflows expiry"))
        })?;
        let held = held
            .checked_add(units)
            .ok_or_else(|| arithmetic_error("held units overflow during reserve"))?;

        let reservation_id = format!("resv:{}", self.next_sequence + 1);
        self.append_entry(
            ClaimEntryKind::Reserve {
                reservation_id: reservation_id.clone(),
            },
            key.clone(),
            units,
            Some(reference_id),
            now,
        )?;
        self.held_units.insert(key.clone(), held);
        self.reservations.insert(
            reservation_id.clone(),
            ReservationRecord {
                reservation_id: reservation_id.clone(),
                key,
                units,
                created_at: now,
                expires_at,
                state: ReservationState::Open,
                terminal_reference_id: None,
            },
        );

        Ok(reservation_id)
    }

    /// Marks the record write as started. Fails if the reservation already
    /// closed, in which case nothing may be written.
    pub fn begin_insert(
        &mut self,
        reservation_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), EntitlementError> {
        let reservation = self.reservations.get_mut(reservation_id).ok_or_else(|| {
            invalid_request(format!("unknown reservation_id '{}'", reservation_id))
        })?;

        match reservation.state {
            ReservationState::Inserting => return Ok(()),
            ReservationState::Open => {}
            state => {
                return Err(ledger_conflict(format!(
                    "reservation '{}' closed as {:?} before its write started",
                    reservation_id, state
                )));
            }
        }

        reservation.state = ReservationState::Inserting;
        let (key, units) = (reservation.key.clone(), reservation.units);
        self.append_entry(
            ClaimEntryKind::Insert {
                reservation_id: reservation_id.to_string(),
            },
            key,
            units,
            None,
            now,
        )
        .map(|_| ())
    }

    pub fn settle_reservation(
        &mut self,
        reservation_id: &str,
        reference_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), EntitlementError> {
        self.close_reservation(reservation_id, reference_id, ReservationState::Settled, now)
    }

    pub fn refund_reservation(
        &mut self,
        reservation_id: &str,
        reference_id: &str,
        now: OffsetDateTime,
    ) -> Result<(), EntitlementError> {
        self.close_reservation(reservation_id, reference_id, ReservationState::Refunded, now)
    }

    pub fn expire_open_reservations(
        &mut self,
        now: OffsetDateTime,
    ) -> Result<Vec<String>, EntitlementError> {
        let to_expire: Vec<String> = self
            .reservations
            .values()
            .filter(|reservation| {
                reservation.state == ReservationState::Open && now >= reservation.expires_at
            })
            .map(|reservation| reservation.reservation_id.clone())
            .collect();

        for reservation_id in &to_expire {
            self.close_reservation(
                reservation_id,
                &format!("expiry:{reservation_id}"),
                ReservationState::Expired,
                now,
            )?;
        }

        Ok(to_expire)
    }

    /// Audit entry for a write that bypassed the guard.
    pub fn record_unguarded(
        &mut self,
        key: ClaimKey,
        units: i64,
        record_id: String,
        now: OffsetDateTime,
    ) -> Result<(), EntitlementError> {
        self.append_entry(
            ClaimEntryKind::Unguarded {
                record_id: record_id.clone(),
            },
            key,
            units,
            Some(record_id),
            now,
        )
        .map(|_| ())
    }

    fn close_reservation(
        &mut self,
        reservation_id: &str,
        reference_id: &str,
        terminal_state: ReservationState,
        now: OffsetDateTime,
    ) -> Result<(), EntitlementError> {
        if terminal_state.is_held() {
            return Err(invalid_request(format!(
                "cannot close a reservation into the {:?} state",
                terminal_state
            )));
        }

        let reservation = self.reservations.get_mut(reservation_id).ok_or_else(|| {
            invalid_request(format!("unknown reservation_id '{}'", reservation_id))
        })?;
        let previous = reservation.state;

        if previous == terminal_state
            && reservation.terminal_reference_id.as_deref() == Some(reference_id)
        {
            return Ok(());
        }
        // An expired reservation whose record was written anyway: the write
        // stands, its units were already released.
        let late_settlement =
            previous == ReservationState::Expired && terminal_state == ReservationState::Settled;
        if !previous.is_held() && !late_settlement {
            return Err(ledger_conflict(format!(
                "reservation '{}' already terminal via reference {:?}",
                reservation_id, reservation.terminal_reference_id
            )));
        }

        reservation.state = terminal_state;
        reservation.terminal_reference_id = Some(reference_id.to_string());
        let (key, units) = (reservation.key.clone(), reservation.units);

        if late_settlement {
            tracing::warn!(
                target: "claims",
                reservation_id = %reservation_id,
                reference_id = %reference_id,
                "late_settlement_after_expiry"
            );
        } else {
            self.release_units(&key, units);
            self.closed.push_back(reservation_id.to_string());
            self.prune_closed();
        }

        let reservation_id = reservation_id.to_string();
        let kind = match terminal_state {
            ReservationState::Settled => ClaimEntryKind::Settle { reservation_id },
            ReservationState::Refunded => ClaimEntryKind::Refund { reservation_id },
            _ => ClaimEntryKind::Expire { reservation_id },
        };
        self.append_entry(kind, key, units, Some(reference_id.to_string()), now)
            .map(|_| ())
    }

    fn release_units(&mut self, key: &ClaimKey, units: i64) {
        if let Some(held) = self.held_units.get_mut(key) {
            *held = held.saturating_sub(units);
            if *held <= 0 {
                self.held_units.remove(key);
            }
        }
    }

    fn prune_closed(&mut self) {
        while self.closed.len() > self.history_limit {
            if let Some(oldest) = self.closed.pop_front() {
                self.reservations.remove(&oldest);
            }
        }
    }

    fn append_entry(
        &mut self,
        kind: ClaimEntryKind,
        key: ClaimKey,
        units: i64,
        reference_id: Option<String>,
        recorded_at: OffsetDateTime,
    ) -> Result<String, EntitlementError> {
        self.next_sequence = self
            .next_sequence
            .checked_add(1)
            .ok_or_else(|| arithmetic_error("claim ledger sequence overflow"))?;

        let entry_id = format!("claim:{:016}", self.next_sequence);
        self.entries.push_back(ClaimEntry {
            entry_id: entry_id.clone(),
            seq_no: self.next_sequence,
            kind,
            key,
            units,
            reference_id,
            recorded_at,
        });
        while self.entries.len() > self.history_limit {
            self.entries.pop_front();
        }
        Ok(entry_id)
    }
}
