//! Integration tests for the reconciliation engine.
//!
//! Tests cover:
//! - Credit settlement, ledger math, and access threshold crossing
//! - Idempotency under duplicate webhook delivery
//! - No double-credit under concurrent delivery
//! - Amount tolerance boundary and review flagging
//! - Failure, reversal, and unknown-reference handling
//!
//! Everything runs against the in-memory store; the engine cannot tell
//! the difference, which is the point of the repository seams.

use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use learngate_backend::audit::TracingAuditLog;
use learngate_backend::domain::{
    AccessPolicy, EnrollmentStatus, PaymentPlan, PaymentStatus, PendingStatus, PendingTransaction,
};
use learngate_backend::notify;
use learngate_backend::reconcile::{ReconcileConfig, ReconcileOutcome, ReconciliationEngine};
use learngate_backend::store::memory::InMemoryStore;
use learngate_backend::store::PendingTransactionRepo;
use learngate_backend::webhook::{EventKind, GatewayEvent};

struct Harness {
    store: Arc<InMemoryStore>,
    engine: Arc<ReconciliationEngine>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let (notifications, _dispatcher) = notify::channel(64, Arc::new(notify::LoggingNotifier));
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(TracingAuditLog),
        notifications,
        AccessPolicy::default(),
        ReconcileConfig::default(),
    ));
    Harness { store, engine }
}

fn decimal(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn pending_tx(reference: &str, enrollment_id: Option<Uuid>, amount: &str) -> PendingTransaction {
    PendingTransaction::new(
        reference.to_string(),
        Uuid::new_v4(),
        enrollment_id,
        None,
        decimal(amount),
        "NGN".to_string(),
        "9901234567".to_string(),
        "Wema Bank".to_string(),
        "LEARNGATE / ADAEZE OKAFOR".to_string(),
        "VA-55001".to_string(),
        Utc::now() + chrono::Duration::hours(24),
    )
}

fn credit_event(reference: &str, amount: &str) -> GatewayEvent {
    GatewayEvent {
        kind: EventKind::Credit,
        reference: Some(reference.to_string()),
        account_number: None,
        amount: decimal(amount),
        currency: Some("NGN".to_string()),
        gateway_transaction_id: Some("90001".to_string()),
        sender_phone: None,
        narration: Some("course fees".to_string()),
        occurred_at: None,
    }
}

fn event_of_kind(kind: EventKind, reference: &str, amount: &str) -> GatewayEvent {
    GatewayEvent {
        kind,
        ..credit_event(reference, amount)
    }
}

/// Seed a plan plus a pending transaction against it, returning the
/// enrollment id.
async fn seed(h: &Harness, reference: &str, fee: &str, expected: &str) -> Uuid {
    let enrollment_id = Uuid::new_v4();
    h.store
        .seed_plan(PaymentPlan::new(enrollment_id, decimal(fee), "NGN".to_string()));
    h.store
        .insert(&pending_tx(reference, Some(enrollment_id), expected))
        .await
        .unwrap();
    enrollment_id
}

#[tokio::test]
async fn test_partial_credit_unlocks_content_and_keeps_certificate_blocked() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-1", "1000", "350").await;

    // 350 of 1000 is 35%, past the 30% unlock threshold.
    let outcome = h.engine.process_event(credit_event("LGP-1", "350")).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Credited {
            requires_review: false,
            content_unlocked_now: true,
            ..
        }
    ));

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
    assert_eq!(plan.balance(), decimal("650"));
    assert_eq!(plan.status.as_str(), "partial");

    let enrollment = h.store.enrollment_snapshot(enrollment_id).unwrap();
    assert_eq!(enrollment.status, EnrollmentStatus::InProgress);
    assert!(enrollment.certificate_blocked);

    let pending = h.store.pending_snapshot("LGP-1").unwrap();
    assert_eq!(pending.status, PendingStatus::Successful);
}

#[tokio::test]
async fn test_second_credit_completes_plan_and_releases_certificate() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-2", "1000", "350").await;
    h.engine.process_event(credit_event("LGP-2", "350")).await.unwrap();

    // A second payment request settles the remainder.
    h.store
        .insert(&pending_tx("LGP-2b", Some(enrollment_id), "650"))
        .await
        .unwrap();
    h.engine.process_event(credit_event("LGP-2b", "650")).await.unwrap();

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("1000"));
    assert_eq!(plan.balance(), decimal("0"));
    assert_eq!(plan.status.as_str(), "completed");

    let enrollment = h.store.enrollment_snapshot(enrollment_id).unwrap();
    assert!(!enrollment.certificate_blocked);
    assert_eq!(enrollment.payment_status.as_str(), "completed");
}

#[tokio::test]
async fn test_replayed_webhook_is_absorbed() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-3", "1000", "350").await;

    let first = h.engine.process_event(credit_event("LGP-3", "350")).await.unwrap();
    assert!(matches!(first, ReconcileOutcome::Credited { .. }));

    // Identical redelivery: no-op, nothing changes.
    let second = h.engine.process_event(credit_event("LGP-3", "350")).await.unwrap();
    assert!(matches!(second, ReconcileOutcome::AlreadyProcessed { .. }));

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
    assert_eq!(h.store.record_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_credit_exactly_once() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-4", "1000", "350").await;

    let engine_a = h.engine.clone();
    let engine_b = h.engine.clone();
    let a = tokio::spawn(async move { engine_a.process_event(credit_event("LGP-4", "350")).await });
    let b = tokio::spawn(async move { engine_b.process_event(credit_event("LGP-4", "350")).await });

    let outcome_a = a.await.unwrap().unwrap();
    let outcome_b = b.await.unwrap().unwrap();

    let credited = [&outcome_a, &outcome_b]
        .iter()
        .filter(|o| matches!(o, ReconcileOutcome::Credited { .. }))
        .count();
    assert_eq!(credited, 1, "exactly one delivery must win");

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
    assert_eq!(h.store.record_count(), 1);
}

#[tokio::test]
async fn test_tolerance_boundary_at_ninety_nine_percent() {
    let h = harness();

    // Exactly 99%: clean acceptance.
    seed(&h, "LGP-5", "5000", "1000").await;
    let outcome = h.engine.process_event(credit_event("LGP-5", "990")).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Credited {
            requires_review: false,
            ..
        }
    ));
    let record = h.store.record_snapshot("LGP-5").unwrap();
    assert_eq!(record.amount, decimal("990"));

    // 98.9%: still credited in full, but flagged.
    seed(&h, "LGP-6", "5000", "1000").await;
    let outcome = h.engine.process_event(credit_event("LGP-6", "989")).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Credited {
            requires_review: true,
            ..
        }
    ));
    let record = h.store.record_snapshot("LGP-6").unwrap();
    assert_eq!(record.amount, decimal("989"), "received amount is credited, not expected");
    assert!(record.requires_review);
}

#[tokio::test]
async fn test_unknown_reference_is_logged_and_dropped() {
    let h = harness();
    let outcome = h
        .engine
        .process_event(credit_event("LGP-missing", "100"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::NoMatch);
    assert_eq!(h.store.record_count(), 0);
}

#[tokio::test]
async fn test_resolution_falls_back_to_account_number() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-7", "1000", "350").await;

    // Gateway event with no usable reference, only the credited account.
    let mut event = credit_event("ignored", "350");
    event.reference = None;
    event.account_number = Some("9901234567".to_string());

    let outcome = h.engine.process_event(event).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Credited { .. }));

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
}

#[tokio::test]
async fn test_failed_event_has_no_ledger_effect() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-8", "1000", "350").await;

    let outcome = h
        .engine
        .process_event(event_of_kind(EventKind::Failed, "LGP-8", "350"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::MarkedFailed { .. }));

    let pending = h.store.pending_snapshot("LGP-8").unwrap();
    assert_eq!(pending.status, PendingStatus::Failed);
    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("0"));
    assert_eq!(h.store.record_count(), 0);

    // A late credit for the failed transaction is absorbed.
    let late = h.engine.process_event(credit_event("LGP-8", "350")).await.unwrap();
    assert!(matches!(late, ReconcileOutcome::AlreadyProcessed { .. }));
}

#[tokio::test]
async fn test_reversal_refunds_record_without_relocking_access() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-9", "1000", "1000").await;
    h.engine.process_event(credit_event("LGP-9", "1000")).await.unwrap();

    let before = h.store.enrollment_snapshot(enrollment_id).unwrap();
    assert_eq!(before.status, EnrollmentStatus::InProgress);

    let outcome = h
        .engine
        .process_event(event_of_kind(EventKind::Reversed, "LGP-9", "1000"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Reversed { .. }));

    let pending = h.store.pending_snapshot("LGP-9").unwrap();
    assert_eq!(pending.status, PendingStatus::Reversed);
    let record = h.store.record_snapshot("LGP-9").unwrap();
    assert_eq!(record.status, PaymentStatus::Refunded);

    // Conservative reversal: ledger totals and access are untouched.
    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("1000"));
    let after = h.store.enrollment_snapshot(enrollment_id).unwrap();
    assert_eq!(after.status, EnrollmentStatus::InProgress);
}

#[tokio::test]
async fn test_reversal_before_success_is_a_noop() {
    let h = harness();
    seed(&h, "LGP-10", "1000", "350").await;

    let outcome = h
        .engine
        .process_event(event_of_kind(EventKind::Reversed, "LGP-10", "350"))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::AlreadyProcessed { .. }));

    let pending = h.store.pending_snapshot("LGP-10").unwrap();
    assert_eq!(pending.status, PendingStatus::Pending);
}

#[tokio::test]
async fn test_unrecognized_event_is_ignored() {
    let h = harness();
    seed(&h, "LGP-11", "1000", "350").await;

    let outcome = h
        .engine
        .process_event(event_of_kind(EventKind::Unrecognized, "LGP-11", "350"))
        .await
        .unwrap();
    assert_eq!(outcome, ReconcileOutcome::Ignored);
    assert_eq!(h.store.record_count(), 0);
}

#[tokio::test]
async fn test_orphan_credit_is_recorded_for_review() {
    let h = harness();
    // Pending transaction with no enrollment linkage.
    h.store
        .insert(&pending_tx("LGP-12", None, "500"))
        .await
        .unwrap();

    let outcome = h.engine.process_event(credit_event("LGP-12", "500")).await.unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Credited {
            requires_review: true,
            content_unlocked_now: false,
            ..
        }
    ));

    let record = h.store.record_snapshot("LGP-12").unwrap();
    assert!(record.requires_review);
    assert!(record.plan_id.is_none());
}

#[tokio::test]
async fn test_overpayment_clamps_balance_at_zero() {
    let h = harness();
    let enrollment_id = seed(&h, "LGP-13", "1000", "1000").await;

    h.engine.process_event(credit_event("LGP-13", "1500")).await.unwrap();

    let plan = h.store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("1500"));
    assert_eq!(plan.balance(), decimal("0"));
    assert_eq!(plan.status.as_str(), "completed");
    assert!(!h.store.enrollment_snapshot(enrollment_id).unwrap().certificate_blocked);
}
