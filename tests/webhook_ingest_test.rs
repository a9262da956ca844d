//! End-to-end tests for the webhook ingest endpoint.
//!
//! Tests cover:
//! - Signature acceptance and rejection over the real axum router
//! - Generic 200 acknowledgement for business-level problems
//! - Ledger effects of a fully ingested credit

use std::str::FromStr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use bigdecimal::BigDecimal;
use chrono::Utc;
use tower::ServiceExt;
use uuid::Uuid;

use learngate_backend::api::{router, AppState};
use learngate_backend::audit::{AuditLog, TracingAuditLog};
use learngate_backend::config::{AppConfig, GatewayConfig, WebhookConfig};
use learngate_backend::domain::{AccessPolicy, PaymentPlan, PendingStatus, PendingTransaction};
use learngate_backend::gateway::GatewayClient;
use learngate_backend::notify;
use learngate_backend::reconcile::{PollReconciler, ReconcileConfig, ReconciliationEngine};
use learngate_backend::store::memory::InMemoryStore;
use learngate_backend::store::PendingTransactionRepo;
use learngate_backend::webhook::{sign, WebhookVerifier};
use learngate_backend::workers::sweeper::SweeperConfig;

const WEBHOOK_SECRET: &str = "whsec_learngate_integration";
const SIGNATURE_HEADER: &str = "x-webhook-signature";

fn decimal(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn test_config() -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        database_url: "postgres://unused".to_string(),
        gateway: GatewayConfig {
            // Never dialed by the webhook path.
            base_url: "http://127.0.0.1:9".to_string(),
            secret_key: "sk_test_unused".to_string(),
            timeout_secs: 1,
        },
        webhook: WebhookConfig {
            secret: WEBHOOK_SECRET.to_string(),
            signature_header: SIGNATURE_HEADER.to_string(),
        },
        access: AccessPolicy::default(),
        reconcile: ReconcileConfig::default(),
        sweeper: SweeperConfig::default(),
        pending_ttl_hours: 24,
        notification_queue_size: 64,
        db_max_connections: 1,
    }
}

fn build_app() -> (axum::Router, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let audit: Arc<dyn AuditLog> = Arc::new(TracingAuditLog);
    let config = Arc::new(test_config());

    let gateway = Arc::new(
        GatewayClient::new(config.gateway.clone(), audit.clone()).expect("client builds"),
    );
    let (notifications, _dispatcher) = notify::channel(64, Arc::new(notify::LoggingNotifier));
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        store.clone(),
        audit.clone(),
        notifications,
        config.access,
        config.reconcile,
    ));
    let poller = Arc::new(PollReconciler::new(
        store.clone(),
        gateway.clone(),
        engine.clone(),
    ));

    let state = AppState {
        pending: store.clone(),
        ledger: store.clone(),
        engine,
        poller,
        gateway,
        verifier: Arc::new(WebhookVerifier::new(WEBHOOK_SECRET)),
        audit,
        config,
    };
    (router(state), store)
}

async fn seed_payment(store: &Arc<InMemoryStore>, reference: &str) -> Uuid {
    let enrollment_id = Uuid::new_v4();
    store.seed_plan(PaymentPlan::new(
        enrollment_id,
        decimal("1000"),
        "NGN".to_string(),
    ));
    store
        .insert(&PendingTransaction::new(
            reference.to_string(),
            Uuid::new_v4(),
            Some(enrollment_id),
            None,
            decimal("350"),
            "NGN".to_string(),
            "9901234567".to_string(),
            "Wema Bank".to_string(),
            "LEARNGATE / BISI ADE".to_string(),
            "VA-55003".to_string(),
            Utc::now() + chrono::Duration::hours(24),
        ))
        .await
        .unwrap();
    enrollment_id
}

fn credit_body(reference: &str, amount: u32) -> String {
    format!(
        r#"{{"event":"virtualaccount.credit","data":{{"tx_ref":"{reference}","account_number":"9901234567","amount":{amount},"id":88001,"narration":"course fees"}}}}"#
    )
}

fn signed_request(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/webhooks/gateway")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign(WEBHOOK_SECRET, body.as_bytes()))
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_signed_credit_webhook_settles_payment() {
    let (app, store) = build_app();
    let enrollment_id = seed_payment(&store, "LGP-wh1").await;

    let body = credit_body("LGP-wh1", 350);
    let response = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(
        store.pending_snapshot("LGP-wh1").unwrap().status,
        PendingStatus::Successful
    );
    let plan = store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
}

#[tokio::test]
async fn test_bad_signature_is_rejected_and_never_processed() {
    let (app, store) = build_app();
    seed_payment(&store, "LGP-wh2").await;

    let body = credit_body("LGP-wh2", 350);
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/gateway")
        .header("content-type", "application/json")
        .header(SIGNATURE_HEADER, sign("wrong_secret", body.as_bytes()))
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    assert_eq!(
        store.pending_snapshot("LGP-wh2").unwrap().status,
        PendingStatus::Pending
    );
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn test_missing_signature_header_is_rejected() {
    let (app, store) = build_app();
    seed_payment(&store, "LGP-wh3").await;

    let body = credit_body("LGP-wh3", 350);
    let request = Request::builder()
        .method("POST")
        .uri("/api/webhooks/gateway")
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn test_unknown_reference_still_acknowledged() {
    let (app, store) = build_app();

    let body = credit_body("LGP-ghost", 500);
    let response = app.oneshot(signed_request(&body)).await.unwrap();

    // Business-level miss: generic 200, nothing leaks, nothing credited.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn test_unrecognized_event_type_acknowledged() {
    let (app, store) = build_app();
    seed_payment(&store, "LGP-wh4").await;

    let body = r#"{"event":"customer.kyc_updated","data":{"tx_ref":"LGP-wh4","amount":0}}"#;
    let response = app.oneshot(signed_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        store.pending_snapshot("LGP-wh4").unwrap().status,
        PendingStatus::Pending
    );
}

#[tokio::test]
async fn test_malformed_body_with_valid_signature_acknowledged() {
    let (app, store) = build_app();

    let body = "not json at all";
    let response = app.oneshot(signed_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(store.record_count(), 0);
}

#[tokio::test]
async fn test_replayed_webhook_acknowledged_without_double_credit() {
    let (app, store) = build_app();
    let enrollment_id = seed_payment(&store, "LGP-wh5").await;

    let body = credit_body("LGP-wh5", 350);
    let first = app.clone().oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let second = app.oneshot(signed_request(&body)).await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);

    let plan = store.plan_snapshot(enrollment_id).unwrap();
    assert_eq!(plan.total_paid, decimal("350"));
    assert_eq!(store.record_count(), 1);
}
