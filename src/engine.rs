use std::{collections::BTreeMap, sync::Arc};

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::{
    allocation::{AllocationReport, candidate_events, evaluate_allocations, evaluate_field},
    balance::{Balance, BenefitReport, compute_balance, evaluate_benefit, evaluate_benefits},
    catalog::{BenefitScope, Catalog},
    claims::{
        ClaimCoordinator, ClaimKey, ClaimReceipt, ClaimRequest, ClaimTarget, derive_record_id,
    },
    consumption::{
        ConsumptionRecord, Fulfillment, SymposiumRegistration, TicketClaim, VipDinnerRsvp,
        aggregate_allocation_consumption,
    },
    error::{EntitlementError, invalid_request, ledger_conflict, unknown_reference},
    overrides::OverrideStore,
    resolver::Entitlement,
    store::EntitlementStore,
    types::{EvaluationContext, EventId},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementReport {
    pub benefits: BenefitReport,
    pub allocations: AllocationReport,
}

/// Loads snapshots through the storage port, evaluates them with the pure
/// resolver/ledger/balance functions, and routes writes through the claim
/// guard.
pub struct EntitlementEngine {
    store: Arc<dyn EntitlementStore>,
    claims: ClaimCoordinator,
}

impl EntitlementEngine {
    pub fn new(store: Arc<dyn EntitlementStore>, claims: ClaimCoordinator) -> Self {
        Self { store, claims }
    }

    pub fn with_store(store: Arc<dyn EntitlementStore>) -> Self {
        Self::new(store, ClaimCoordinator::default())
    }

    pub fn claims(&self) -> &ClaimCoordinator {
        &self.claims
    }

    async fn load_benefit_inputs(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<(Catalog, OverrideStore, Vec<Fulfillment>), EntitlementError> {
        let package_benefits = async {
            match ctx.package_id.as_deref() {
                Some(package_id) => self.store.package_benefits(package_id).await,
                None => Ok(Vec::new()),
            }
        };

        // Fulfillments are read for every year: one-time benefits accumulate
        // across years and the ledger applies the per-scope filter.
        let (benefits, package_benefits, benefit_overrides, fulfillments) = tokio::try_join!(
            self.store.benefit_definitions(),
            package_benefits,
            self.store
                .benefit_overrides(&ctx.organization_id, Some(ctx.target_year)),
            self.store.fulfillments(&ctx.organization_id, None),
        )?;

        Ok((
            Catalog::new(benefits, package_benefits, Vec::new(), Vec::new()),
            OverrideStore::new(benefit_overrides, Vec::new()),
            fulfillments,
        ))
    }

    async fn load_allocation_inputs(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<(Catalog, OverrideStore), EntitlementError> {
        let (events, allocations, allocation_overrides) = tokio::try_join!(
            self.store.event_definitions(),
            self.store.event_allocations(&ctx.tier_id),
            self.store.allocation_overrides(&ctx.organization_id),
        )?;

        Ok((
            Catalog::new(Vec::new(), Vec::new(), events, allocations),
            OverrideStore::new(Vec::new(), allocation_overrides),
        ))
    }

    #[tracing::instrument(
        name = "benefit_balances",
        target = "entitlements",
        skip(self, ctx),
        fields(organization_id = %ctx.organization_id, target_year = ctx.target_year)
    )]
    pub async fn benefit_balances(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<BenefitReport, EntitlementError> {
        let (catalog, overrides, fulfillments) = self.load_benefit_inputs(ctx).await?;
        Ok(evaluate_benefits(ctx, &catalog, &overrides, &fulfillments))
    }

    #[tracing::instrument(
        name = "event_allocations",
        target = "entitlements",
        skip(self, ctx),
        fields(organization_id = %ctx.organization_id, tier_id = %ctx.tier_id)
    )]
    pub async fn event_allocations(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<AllocationReport, EntitlementError> {
        let (catalog, overrides) = self.load_allocation_inputs(ctx).await?;

        let event_ids: Vec<EventId> = candidate_events(ctx, &catalog, &overrides)
            .into_iter()
            .filter(|event_id| catalog.event(event_id).is_some())
            .collect();
        let consumption = try_join_all(event_ids.iter().map(|event_id| async move {
            self.store
                .event_consumption(&ctx.organization_id, event_id)
                .await
                .map(|recorded| (event_id.clone(), recorded))
        }))
        .await?;
        let consumption: BTreeMap<_, _> = consumption.into_iter().collect();

        Ok(evaluate_allocations(ctx, &catalog, &overrides, &consumption))
    }

    pub async fn evaluate(
        &self,
        ctx: &EvaluationContext,
    ) -> Result<EntitlementReport, EntitlementError> {
        let (benefits, allocations) =
            tokio::try_join!(self.benefit_balances(ctx), self.event_allocations(ctx))?;
        Ok(EntitlementReport {
            benefits,
            allocations,
        })
    }

    /// Fresh balance for one claim target, read straight from the store.
    pub async fn current_balance(
        &self,
        ctx: &EvaluationContext,
        target: &ClaimTarget,
    ) -> Result<Balance, EntitlementError> {
        match target {
            ClaimTarget::Benefit { benefit_id, .. } => {
                let (catalog, overrides, fulfillments) = self.load_benefit_inputs(ctx).await?;
                let benefit = catalog.benefit(benefit_id).ok_or_else(|| {
                    unknown_reference(format!("unknown benefit '{}'", benefit_id))
                })?;
                Ok(
                    evaluate_benefit(ctx, &catalog, &overrides, &fulfillments, benefit)
                        .map(|row| row.balance)
                        .unwrap_or_else(|| compute_balance(&Entitlement::limited(0), 0)),
                )
            }
            ClaimTarget::Allocation { event_id, field } => {
                let (catalog, overrides) = self.load_allocation_inputs(ctx).await?;
                if catalog.event(event_id).is_none() {
                    return Err(unknown_reference(format!("unknown event '{}'", event_id)));
                }
                let recorded = self
                    .store
                    .event_consumption(&ctx.organization_id, event_id)
                    .await?;
                let consumed = aggregate_allocation_consumption(event_id, &recorded);
                Ok(evaluate_field(
                    ctx,
                    &catalog,
                    &overrides,
                    event_id,
                    *field,
                    consumed.count(*field),
                )
                .balance)
            }
        }
    }

    async fn claim_target(
        &self,
        ctx: &EvaluationContext,
        request: &ClaimRequest,
    ) -> Result<ClaimTarget, EntitlementError> {
        match request {
            ClaimRequest::Fulfillment(draft) => {
                let benefits = self.store.benefit_definitions().await?;
                let benefit = benefits
                    .iter()
                    .find(|benefit| benefit.benefit_id == draft.benefit_id)
                    .ok_or_else(|| {
                        unknown_reference(format!("unknown benefit '{}'", draft.benefit_id))
                    })?;
                let period_year = match benefit.scope {
                    BenefitScope::Annual => Some(ctx.target_year),
                    BenefitScope::OneTime => None,
                };
                Ok(ClaimTarget::Benefit {
                    benefit_id: draft.benefit_id.clone(),
                    period_year,
                })
            }
            ClaimRequest::Ticket { event_id, .. }
            | ClaimRequest::SymposiumSeat { event_id, .. }
            | ClaimRequest::VipDinnerSeat { event_id, .. } => {
                let events = self.store.event_definitions().await?;
                if !events.iter().any(|event| &event.event_id == event_id) {
                    return Err(unknown_reference(format!("unknown event '{}'", event_id)));
                }
                let field = request
                    .allocation_field()
                    .ok_or_else(|| invalid_request("claim request has no allocation field"))?;
                Ok(ClaimTarget::Allocation {
                    event_id: event_id.clone(),
                    field,
                })
            }
        }
    }

    /// Records a claim. Requests that consume balance are checked and reserved
    /// under the claim guard before the record is written, so concurrent
    /// claims in this process cannot overdraw a balance.
    ///
    /// `idempotency_key` makes retries safe: replaying a key for the same
    /// target is rejected as a duplicate claim before any balance check, so a
    /// retry gets the same answer whether or not the balance is spent.
    #[tracing::instrument(
        name = "claim",
        target = "claims",
        skip(self, ctx, request, idempotency_key),
        fields(organization_id = %ctx.organization_id)
    )]
    pub async fn claim(
        &self,
        ctx: &EvaluationContext,
        request: ClaimRequest,
        idempotency_key: Option<String>,
    ) -> Result<ClaimReceipt, EntitlementError> {
        validate_request(&request)?;

        let target = self.claim_target(ctx, &request).await?;
        let key = ClaimKey {
            organization_id: ctx.organization_id.clone(),
            target,
        };
        let units = request.units();
        let idempotency_key = idempotency_key.unwrap_or_else(|| Uuid::now_v7().to_string());
        let record = build_record(ctx, &key, &request, &idempotency_key);
        let record_id = record.record_id().to_string();

        if self.store.record_exists(&record).await? {
            return Err(ledger_conflict(format!(
                "duplicate claim: record '{}' already exists",
                record_id
            )));
        }

        if !request.consumes_balance() || !self.claims.is_guarded() {
            self.store.record_consumption(record).await?;
            self.claims
                .record_unguarded(key.clone(), units, record_id.clone())
                .await?;
            tracing::info!(
                target: "claims",
                record_id = %record_id,
                units = units,
                guarded = false,
                "claim_recorded"
            );
            return Ok(ClaimReceipt {
                record_id,
                key,
                units,
                reservation_id: None,
                balance_before: None,
            });
        }

        let target = key.target.clone();
        let ticket = self
            .claims
            .reserve(key.clone(), units, record_id.clone(), || {
                self.current_balance(ctx, &target)
            })
            .await?;
        self.claims.begin_insert(&ticket).await?;

        if let Err(err) = self.store.record_consumption(record).await {
            self.claims
                .refund(&ticket, &format!("failed:{record_id}"))
                .await?;
            tracing::warn!(
                target: "claims",
                record_id = %record_id,
                reservation_id = %ticket.reservation_id,
                error = %err,
                "claim_write_failed_refunded"
            );
            return Err(err.into());
        }
        self.claims.settle(&ticket, &record_id).await?;

        tracing::info!(
            target: "claims",
            record_id = %record_id,
            reservation_id = %ticket.reservation_id,
            units = units,
            guarded = true,
            "claim_recorded"
        );

        Ok(ClaimReceipt {
            record_id,
            key,
            units,
            reservation_id: Some(ticket.reservation_id),
            balance_before: Some(ticket.balance_before),
        })
    }
}

fn validate_request(request: &ClaimRequest) -> Result<(), EntitlementError> {
    let result = match request {
        ClaimRequest::Fulfillment(draft) => draft.validate(),
        ClaimRequest::Ticket { attendee, .. }
        | ClaimRequest::SymposiumSeat { attendee, .. }
        | ClaimRequest::VipDinnerSeat { attendee, .. } => attendee.validate(),
    };
    result.map_err(|err| invalid_request(format!("invalid claim request: {err}")))
}

fn build_record(
    ctx: &EvaluationContext,
    key: &ClaimKey,
    request: &ClaimRequest,
    idempotency_key: &str,
) -> ConsumptionRecord {
    let now = OffsetDateTime::now_utc();
    let organization_id = ctx.organization_id.clone();

    match request {
        ClaimRequest::Fulfillment(draft) => ConsumptionRecord::Fulfillment(Fulfillment {
            fulfillment_id: derive_record_id("ful", key, idempotency_key),
            organization_id,
            benefit_id: draft.benefit_id.clone(),
            status: draft.status,
            quantity: draft.quantity,
            period_year: Some(ctx.target_year),
            title: draft.title.clone(),
            proof_url: draft.proof_url.clone(),
            scheduled_for: None,
        }),
        ClaimRequest::Ticket {
            event_id,
            ticket_type,
            attendee,
        } => ConsumptionRecord::TicketClaim(TicketClaim {
            claim_id: derive_record_id("tkt", key, idempotency_key),
            organization_id,
            member_id: attendee.member_id.clone(),
            event_id: event_id.clone(),
            ticket_type: *ticket_type,
            attendee_name: attendee.name.clone(),
            attendee_email: attendee.email.clone(),
            claimed_at: Some(now),
        }),
        ClaimRequest::SymposiumSeat { event_id, attendee } => {
            ConsumptionRecord::SymposiumRegistration(SymposiumRegistration {
                registration_id: derive_record_id("sym", key, idempotency_key),
                organization_id,
                member_id: attendee.member_id.clone(),
                event_id: event_id.clone(),
                attendee_name: attendee.name.clone(),
                attendee_email: attendee.email.clone(),
                registered_at: Some(now),
            })
        }
        ClaimRequest::VipDinnerSeat { event_id, attendee } => {
            ConsumptionRecord::VipDinnerRsvp(VipDinnerRsvp {
                rsvp_id: derive_record_id("vip", key, idempotency_key),
                organization_id,
                member_id: attendee.member_id.clone(),
                event_id: event_id.clone(),
                attendee_name: attendee.name.clone(),
                attendee_email: attendee.email.clone(),
                responded_at: Some(now),
            })
        }
    }
}
