//! HTTP surface: payment endpoints and the webhook ingest route.

pub mod payments;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};

use crate::audit::AuditLog;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::gateway::GatewayClient;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::reconcile::{PollReconciler, ReconciliationEngine};
use crate::store::{PaymentLedgerRepo, PendingTransactionRepo, StoreError};
use crate::webhook::handler::gateway_webhook;
use crate::webhook::WebhookVerifier;

#[derive(Clone)]
pub struct AppState {
    pub pending: Arc<dyn PendingTransactionRepo>,
    pub ledger: Arc<dyn PaymentLedgerRepo>,
    pub engine: Arc<ReconciliationEngine>,
    pub poller: Arc<PollReconciler>,
    pub gateway: Arc<GatewayClient>,
    pub verifier: Arc<WebhookVerifier>,
    pub audit: Arc<dyn AuditLog>,
    pub config: Arc<AppConfig>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/payments/initialize", post(payments::initialize_payment))
        .route("/api/payments/{reference}", get(payments::payment_status))
        .route("/api/payments/{reference}/check", post(payments::check_payment))
        .route(
            "/api/enrollments/{enrollment_id}/certificate-eligibility",
            get(payments::certificate_eligibility),
        )
        .route("/api/webhooks/gateway", post(gateway_webhook))
        .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
        .layer(axum::middleware::from_fn(request_logging_middleware))
        .layer(PropagateRequestIdLayer::x_request_id())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================================
// Error mapping
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(AppError::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.0 {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            AppError::UnknownReference(reference) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_REFERENCE",
                format!("no payment found for reference {reference}"),
            ),
            AppError::PlanNotFound(enrollment_id) => (
                StatusCode::NOT_FOUND,
                "PLAN_NOT_FOUND",
                format!("no payment plan exists for enrollment {enrollment_id}"),
            ),
            AppError::SignatureInvalid(_) => (
                StatusCode::UNAUTHORIZED,
                "SIGNATURE_INVALID",
                "signature verification failed".to_string(),
            ),
            AppError::Gateway(e) => (
                StatusCode::BAD_GATEWAY,
                "GATEWAY_ERROR",
                e.to_string(),
            ),
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "internal error".to_string(),
            ),
        };
        let retry_after = if self.0.is_retryable() { Some(10) } else { None };
        (
            status,
            Json(ErrorResponse {
                error: ErrorDetail {
                    code,
                    message,
                    retry_after,
                },
            }),
        )
            .into_response()
    }
}
