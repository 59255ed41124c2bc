use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use entitlements::{
    catalog::{AllocationField, BenefitDefinition, EventAllocation, EventDefinition, PackageBenefit},
    claims::{Attendee, ClaimCoordinator, ClaimRequest, ClaimTarget, FulfillmentDraft},
    consumption::{ConsumptionRecord, ConsumptionStatus, EventConsumption, Fulfillment, TicketType},
    engine::EntitlementEngine,
    error::{EntitlementErrorKind, StoreError},
    overrides::{OrganizationAllocationOverride, OrganizationBenefitOverride, OverrideMode},
    store::{EntitlementStore, InMemoryStore, StoreContents},
    types::{EvaluationContext, PeriodYear},
};
use time::Duration;

use crate::fixtures::{ORG, SUMMIT, benefit_override, completed, ctx, seeded_contents, ticket};

/// Delegates to an in-memory store but holds the first record write for
/// `write_delay`.
struct SlowWriteStore {
    inner: InMemoryStore,
    write_delay: std::time::Duration,
    delayed: AtomicBool,
}

impl SlowWriteStore {
    fn new(contents: StoreContents, write_delay: std::time::Duration) -> Self {
        Self {
            inner: InMemoryStore::new(contents),
            write_delay,
            delayed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl EntitlementStore for SlowWriteStore {
    async fn package_benefits(&self, package_id: &str) -> Result<Vec<PackageBenefit>, StoreError> {
        self.inner.package_benefits(package_id).await
    }

    async fn benefit_definitions(&self) -> Result<Vec<BenefitDefinition>, StoreError> {
        self.inner.benefit_definitions().await
    }

    async fn benefit_overrides(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<OrganizationBenefitOverride>, StoreError> {
        self.inner.benefit_overrides(organization_id, period_year).await
    }

    async fn fulfillments(
        &self,
        organization_id: &str,
        period_year: Option<PeriodYear>,
    ) -> Result<Vec<Fulfillment>, StoreError> {
        self.inner.fulfillments(organization_id, period_year).await
    }

    async fn event_definitions(&self) -> Result<Vec<EventDefinition>, StoreError> {
        self.inner.event_definitions().await
    }

    async fn event_allocations(&self, tier_id: &str) -> Result<Vec<EventAllocation>, StoreError> {
        self.inner.event_allocations(tier_id).await
    }

    async fn allocation_overrides(
        &self,
        organization_id: &str,
    ) -> Result<Vec<OrganizationAllocationOverride>, StoreError> {
        self.inner.allocation_overrides(organization_id).await
    }

    async fn event_consumption(
        &self,
        organization_id: &str,
        event_id: &str,
    ) -> Result<EventConsumption, StoreError> {
        self.inner.event_consumption(organization_id, event_id).await
    }

    async fn record_exists(&self, record: &ConsumptionRecord) -> Result<bool, StoreError> {
        self.inner.record_exists(record).await
    }

    async fn record_consumption(&self, record: ConsumptionRecord) -> Result<(), StoreError> {
        if !self.delayed.swap(true, Ordering::SeqCst) {
            tokio::time::sleep(self.write_delay).await;
        }
        self.inner.record_consumption(record).await
    }
}

fn engine_with(contents: StoreContents, guarded: bool) -> (Arc<InMemoryStore>, EntitlementEngine) {
    let store = Arc::new(InMemoryStore::new(contents));
    let engine = EntitlementEngine::new(
        store.clone(),
        ClaimCoordinator::new(guarded, Duration::seconds(30)),
    );
    (store, engine)
}

fn attendee(name: &str) -> Attendee {
    Attendee {
        member_id: None,
        name: name.to_string(),
        email: Some(format!("{}@example.com", name.to_lowercase())),
    }
}

fn general_ticket(name: &str) -> ClaimRequest {
    ClaimRequest::Ticket {
        event_id: SUMMIT.to_string(),
        ticket_type: TicketType::General,
        attendee: attendee(name),
    }
}

fn draft(benefit_id: &str, status: ConsumptionStatus, quantity: i64) -> ClaimRequest {
    ClaimRequest::Fulfillment(FulfillmentDraft {
        benefit_id: benefit_id.to_string(),
        quantity,
        status,
        title: Some("Keynote".to_string()),
        proof_url: None,
    })
}

#[tokio::test]
async fn given_seeded_store_when_evaluating_then_benefits_and_allocations_are_reported() {
    let mut contents = seeded_contents();
    contents.fulfillments.push(completed("f-1", "speaking-slot", 2024));
    contents.fulfillments.push(completed("f-0", "case-study", 2022));
    contents.benefit_overrides.push(benefit_override(
        "ovr-1",
        "speaking-slot",
        OverrideMode::Additive,
        Some(1),
        Some(2024),
    ));
    let (_, engine) = engine_with(contents, true);

    let report = engine.evaluate(&ctx(2024)).await.expect("evaluation should succeed");

    let speaking = report.benefits.row("speaking-slot").expect("speaking slot row");
    assert_eq!(speaking.balance.entitled, 3);
    assert_eq!(speaking.balance.remaining, 2);
    assert!(speaking.has_override);

    let case_study = report.benefits.row("case-study").expect("case study row");
    assert_eq!(case_study.balance.remaining, 0);

    let summit = report.allocations.event(SUMMIT).expect("summit listed");
    assert_eq!(summit.fields.len(), 2);
}

#[tokio::test]
async fn given_no_package_when_evaluating_then_only_overridden_benefits_are_visible() {
    let mut contents = seeded_contents();
    contents.benefit_overrides.push(benefit_override(
        "ovr-1",
        "case-study",
        OverrideMode::Absolute,
        Some(3),
        None,
    ));
    let (_, engine) = engine_with(contents, true);
    let ctx = EvaluationContext::new(ORG, "executive", None, 2024);

    let report = engine.benefit_balances(&ctx).await.expect("evaluation should succeed");
    assert_eq!(report.rows.len(), 1);
    assert_eq!(report.rows[0].balance.entitled, 3);
}

#[tokio::test]
async fn given_remaining_balance_when_claiming_fulfillment_then_record_is_written_and_balance_drops() {
    let (store, engine) = engine_with(seeded_contents(), true);

    let receipt = engine
        .claim(&ctx(2024), draft("speaking-slot", ConsumptionStatus::Completed, 1), None)
        .await
        .expect("claim should succeed");

    assert!(receipt.reservation_id.is_some());
    assert_eq!(
        receipt.balance_before.map(|balance| balance.remaining),
        Some(2)
    );
    assert_eq!(
        receipt.key.target,
        ClaimTarget::Benefit {
            benefit_id: "speaking-slot".to_string(),
            period_year: Some(2024),
        }
    );
    assert_eq!(store.contents().await.fulfillments.len(), 1);

    let report = engine.benefit_balances(&ctx(2024)).await.expect("evaluation");
    assert_eq!(
        report.row("speaking-slot").map(|row| row.balance.remaining),
        Some(1)
    );

    let ledger = engine.claims().ledger_snapshot().await;
    assert_eq!(ledger.open_reservation_count(), 0);
}

#[tokio::test]
async fn given_exhausted_balance_when_claiming_then_claim_is_rejected_without_writing() {
    let (store, engine) = engine_with(seeded_contents(), true);

    engine
        .claim(&ctx(2024), general_ticket("Ada"), None)
        .await
        .expect("first ticket fits the allocation");
    let err = engine
        .claim(&ctx(2024), general_ticket("Grace"), None)
        .await
        .expect_err("second ticket exceeds the allocation");

    assert_eq!(err.kind, EntitlementErrorKind::AllocationExhausted);
    assert!(!err.is_transport());
    assert_eq!(store.contents().await.ticket_claims.len(), 1);
}

#[tokio::test]
async fn given_one_time_benefit_when_claiming_then_claim_key_spans_all_years() {
    let (_, engine) = engine_with(seeded_contents(), true);

    let receipt = engine
        .claim(&ctx(2024), draft("case-study", ConsumptionStatus::Completed, 1), None)
        .await
        .expect("claim should succeed");
    assert_eq!(
        receipt.key.target,
        ClaimTarget::Benefit {
            benefit_id: "case-study".to_string(),
            period_year: None,
        }
    );

    let err = engine
        .claim(&ctx(2025), draft("case-study", ConsumptionStatus::Completed, 1), None)
        .await
        .expect_err("one-time benefit is spent for every year");
    assert_eq!(err.kind, EntitlementErrorKind::AllocationExhausted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_claims_against_last_unit_when_guarded_then_exactly_one_succeeds() {
    let (store, engine) = engine_with(seeded_contents(), true);
    let engine = Arc::new(engine);

    let handles: Vec<_> = ["Ada", "Grace", "Linus", "Barbara"]
        .into_iter()
        .map(|name| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                let context = ctx(2024);
                engine.claim(&context, general_ticket(name), None).await
            })
        })
        .collect();

    let mut succeeded = 0;
    let mut exhausted = 0;
    for handle in handles {
        match handle.await.expect("claim task should not panic") {
            Ok(_) => succeeded += 1,
            Err(err) if err.kind == EntitlementErrorKind::AllocationExhausted => exhausted += 1,
            Err(err) => panic!("unexpected claim error: {err}"),
        }
    }

    assert_eq!(succeeded, 1);
    assert_eq!(exhausted, 3);
    assert_eq!(store.contents().await.ticket_claims.len(), 1);
}

#[tokio::test]
async fn given_unguarded_claims_when_claiming_past_the_limit_then_over_allocation_is_possible() {
    let (store, engine) = engine_with(seeded_contents(), false);

    for name in ["Ada", "Grace"] {
        let receipt = engine
            .claim(&ctx(2024), general_ticket(name), None)
            .await
            .expect("unguarded claims are plain inserts");
        assert!(receipt.reservation_id.is_none());
    }
    assert_eq!(store.contents().await.ticket_claims.len(), 2);

    let report = engine.event_allocations(&ctx(2024)).await.expect("evaluation");
    let general = report
        .event(SUMMIT)
        .and_then(|view| view.field(AllocationField::GeneralTickets))
        .expect("general tickets listed");
    assert_eq!(general.balance.fulfilled, 2);
    assert_eq!(general.balance.remaining, 0);
}

#[tokio::test]
async fn given_scheduled_fulfillment_when_balance_is_spent_then_it_is_recorded_unguarded() {
    let mut contents = seeded_contents();
    contents.fulfillments.push(completed("f-0", "case-study", 2024));
    let (store, engine) = engine_with(contents, true);

    let receipt = engine
        .claim(&ctx(2024), draft("case-study", ConsumptionStatus::Scheduled, 1), None)
        .await
        .expect("scheduled work does not consume balance");
    assert!(receipt.reservation_id.is_none());
    assert_eq!(store.contents().await.fulfillments.len(), 2);

    let report = engine.benefit_balances(&ctx(2024)).await.expect("evaluation");
    let row = report.row("case-study").expect("case study row");
    assert_eq!(row.scheduled_count, 1);
    assert_eq!(row.balance.remaining, 0);
}

#[tokio::test]
async fn given_replayed_idempotency_key_when_claiming_then_duplicate_is_rejected_without_reserving() {
    let (store, engine) = engine_with(seeded_contents(), true);
    let key = Some("req-42".to_string());

    let first = engine
        .claim(&ctx(2024), draft("speaking-slot", ConsumptionStatus::Completed, 1), key.clone())
        .await
        .expect("first claim should succeed");
    let err = engine
        .claim(&ctx(2024), draft("speaking-slot", ConsumptionStatus::Completed, 1), key)
        .await
        .expect_err("replay must not write twice");

    assert_eq!(err.kind, EntitlementErrorKind::LedgerConflict);
    assert!(!err.is_transport());
    assert!(err.message.contains("duplicate claim"));
    let contents = store.contents().await;
    assert_eq!(contents.fulfillments.len(), 1);
    assert_eq!(contents.fulfillments[0].fulfillment_id, first.record_id);

    let ledger = engine.claims().ledger_snapshot().await;
    assert_eq!(ledger.open_reservation_count(), 0);
    assert_eq!(ledger.reservations.len(), 1);
}

#[tokio::test]
async fn given_spent_allocation_when_retrying_same_idempotency_key_then_duplicate_is_reported() {
    let (store, engine) = engine_with(seeded_contents(), true);
    let key = Some("req-7".to_string());

    engine
        .claim(&ctx(2024), general_ticket("Ada"), key.clone())
        .await
        .expect("the only general ticket fits");

    let retry = engine
        .claim(&ctx(2024), general_ticket("Ada"), key)
        .await
        .expect_err("retry must not write twice");
    assert_eq!(retry.kind, EntitlementErrorKind::LedgerConflict);

    let fresh = engine
        .claim(&ctx(2024), general_ticket("Grace"), Some("req-8".to_string()))
        .await
        .expect_err("a new claim still meets the spent allocation");
    assert_eq!(fresh.kind, EntitlementErrorKind::AllocationExhausted);
    assert_eq!(store.contents().await.ticket_claims.len(), 1);
}

#[tokio::test]
async fn given_write_slower_than_reservation_ttl_when_second_claim_arrives_then_units_are_not_reissued() {
    let store = Arc::new(SlowWriteStore::new(
        seeded_contents(),
        std::time::Duration::from_millis(300),
    ));
    let engine = Arc::new(EntitlementEngine::new(
        store.clone(),
        ClaimCoordinator::new(true, Duration::milliseconds(50)),
    ));

    let slow_claim = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let context = ctx(2024);
            engine.claim(&context, general_ticket("Ada"), None).await
        })
    };
    tokio::time::sleep(std::time::Duration::from_millis(120)).await;

    let late = engine
        .claim(&ctx(2024), general_ticket("Grace"), None)
        .await
        .expect_err("the only ticket is still being written");
    assert_eq!(late.kind, EntitlementErrorKind::AllocationExhausted);

    let first = slow_claim
        .await
        .expect("claim task should not panic")
        .expect("the slow write still settles");
    assert!(first.reservation_id.is_some());
    assert_eq!(store.inner.contents().await.ticket_claims.len(), 1);

    let ledger = engine.claims().ledger_snapshot().await;
    assert_eq!(ledger.open_reservation_count(), 0);
    assert_eq!(ledger.open_units(&first.key), 0);
}

#[tokio::test]
async fn given_record_for_unknown_event_when_written_directly_then_store_rejects_it() {
    let (store, _) = engine_with(seeded_contents(), true);

    let err = store
        .record_consumption(ConsumptionRecord::TicketClaim(ticket(
            "t-9",
            ORG,
            "cancelled-expo",
            TicketType::General,
        )))
        .await
        .expect_err("unknown event must be rejected");
    assert!(matches!(err, StoreError::Rejected(_)));
    assert!(store.contents().await.ticket_claims.is_empty());
}

#[tokio::test]
async fn given_unavailable_store_when_evaluating_or_claiming_then_storage_error_surfaces() {
    let (store, engine) = engine_with(seeded_contents(), true);
    store.set_unavailable(true);

    let err = engine
        .benefit_balances(&ctx(2024))
        .await
        .expect_err("evaluation must fail");
    assert_eq!(err.kind, EntitlementErrorKind::Storage);
    assert!(err.is_transport());

    let err = engine
        .claim(&ctx(2024), general_ticket("Ada"), None)
        .await
        .expect_err("claim must fail");
    assert!(err.is_transport());

    store.set_unavailable(false);
    assert!(engine.event_allocations(&ctx(2024)).await.is_ok());
}

#[tokio::test]
async fn given_invalid_or_unknown_requests_when_claiming_then_they_are_rejected_up_front() {
    let (store, engine) = engine_with(seeded_contents(), true);

    let err = engine
        .claim(&ctx(2024), general_ticket(""), None)
        .await
        .expect_err("blank attendee name");
    assert_eq!(err.kind, EntitlementErrorKind::InvalidRequest);

    let err = engine
        .claim(&ctx(2024), draft("speaking-slot", ConsumptionStatus::Completed, 0), None)
        .await
        .expect_err("zero quantity");
    assert_eq!(err.kind, EntitlementErrorKind::InvalidRequest);

    let err = engine
        .claim(&ctx(2024), draft("retired-benefit", ConsumptionStatus::Completed, 1), None)
        .await
        .expect_err("unknown benefit");
    assert_eq!(err.kind, EntitlementErrorKind::UnknownReference);

    let err = engine
        .claim(
            &ctx(2024),
            ClaimRequest::VipDinnerSeat {
                event_id: "cancelled-expo".to_string(),
                attendee: attendee("Ada"),
            },
            None,
        )
        .await
        .expect_err("unknown event");
    assert_eq!(err.kind, EntitlementErrorKind::UnknownReference);

    let contents = store.contents().await;
    assert!(contents.fulfillments.is_empty());
    assert!(contents.vip_dinner_rsvps.is_empty());
}

#[tokio::test]
async fn given_unlimited_benefit_when_claiming_repeatedly_then_every_claim_succeeds() {
    let (_, engine) = engine_with(seeded_contents(), true);

    for _ in 0..5 {
        engine
            .claim(
                &ctx(2024),
                draft("newsletter-mention", ConsumptionStatus::Completed, 3),
                None,
            )
            .await
            .expect("unlimited claims never exhaust");
    }

    let report = engine.benefit_balances(&ctx(2024)).await.expect("evaluation");
    let row = report.row("newsletter-mention").expect("newsletter row");
    assert_eq!(row.balance.fulfilled, 15);
    assert_eq!(row.balance.remaining, -1);
}
