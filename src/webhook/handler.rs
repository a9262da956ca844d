//! Gateway webhook endpoint.
//!
//! A failed signature is the only condition that does not get a 200.
//! Business-level problems (unknown reference, duplicate, malformed JSON)
//! are acknowledged generically so the response leaks nothing about our
//! validation and the gateway does not hammer us with retries that
//! support should handle instead. Missed events are recovered by the
//! sweeper's poll path.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::api::AppState;
use crate::audit::{AuditEntry, AuditKind};
use crate::webhook::WebhookPayload;

pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header_name = state.config.webhook.signature_header.as_str();
    let signature = headers
        .get(header_name)
        .and_then(|value| value.to_str().ok());

    let Some(signature) = signature else {
        warn!(event_type = "security", "Webhook without signature header rejected");
        state
            .audit
            .append(AuditEntry::webhook(
                AuditKind::WebhookRejected,
                None,
                "missing signature header",
            ))
            .await;
        return rejected();
    };

    if let Err(e) = state.verifier.verify(&body, signature) {
        warn!(event_type = "security", error = %e, "Webhook signature rejected");
        state
            .audit
            .append(AuditEntry::webhook(
                AuditKind::WebhookRejected,
                None,
                format!("signature rejected: {e}"),
            ))
            .await;
        return rejected();
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Webhook body did not parse, acknowledging");
            return acknowledged();
        }
    };

    match state.engine.process_event(payload.into_event()).await {
        Ok(outcome) => debug!(?outcome, "Webhook processed"),
        Err(e) => {
            // Nothing was credited; the poll-reconciler settles this later.
            error!(error = %e, "Ledger write failed while processing webhook");
        }
    }

    acknowledged()
}

fn acknowledged() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}

fn rejected() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "status": "rejected" }))).into_response()
}
