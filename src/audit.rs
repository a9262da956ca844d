//! Append-only audit trail.
//!
//! Every outbound gateway call and every reconciliation transition is
//! appended here for dispute resolution. The sink is injected so the
//! gateway client and the engine stay storage-agnostic; the Postgres
//! sink falls back to the structured log if the insert fails, so an
//! entry is never silently lost.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};

/// What an entry describes.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    GatewayCall,
    StateTransition,
    WebhookRejected,
    WebhookDropped,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::GatewayCall => "gateway_call",
            AuditKind::StateTransition => "state_transition",
            AuditKind::WebhookRejected => "webhook_rejected",
            AuditKind::WebhookDropped => "webhook_dropped",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub kind: AuditKind,
    pub reference: Option<String>,
    /// Method and path for gateway calls, e.g. `GET /transactions/verify/..`.
    pub endpoint: Option<String>,
    pub request: Option<serde_json::Value>,
    /// Raw response body, truncated.
    pub response: Option<String>,
    pub status_code: Option<u16>,
    pub outcome: String,
    pub at: DateTime<Utc>,
}

const MAX_RESPONSE_LEN: usize = 2048;

impl AuditEntry {
    pub fn gateway_call(
        endpoint: String,
        reference: Option<String>,
        request: Option<serde_json::Value>,
        response: Option<String>,
        status_code: Option<u16>,
        outcome: String,
    ) -> Self {
        Self {
            kind: AuditKind::GatewayCall,
            reference,
            endpoint: Some(endpoint),
            request,
            response: response.map(|r| truncate(r, MAX_RESPONSE_LEN)),
            status_code,
            outcome,
            at: Utc::now(),
        }
    }

    pub fn transition(reference: &str, outcome: impl Into<String>) -> Self {
        Self {
            kind: AuditKind::StateTransition,
            reference: Some(reference.to_string()),
            endpoint: None,
            request: None,
            response: None,
            status_code: None,
            outcome: outcome.into(),
            at: Utc::now(),
        }
    }

    pub fn webhook(kind: AuditKind, reference: Option<String>, outcome: impl Into<String>) -> Self {
        Self {
            kind,
            reference,
            endpoint: None,
            request: None,
            response: None,
            status_code: None,
            outcome: outcome.into(),
            at: Utc::now(),
        }
    }
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append an entry. Implementations must not fail the caller; a sink
    /// problem is logged, never propagated into a payment path.
    async fn append(&self, entry: AuditEntry);
}

/// Sink that emits entries as structured log events.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn append(&self, entry: AuditEntry) {
        info!(
            event_type = "audit",
            kind = entry.kind.as_str(),
            reference = entry.reference.as_deref().unwrap_or("-"),
            endpoint = entry.endpoint.as_deref().unwrap_or("-"),
            status_code = entry.status_code.map(|c| c as i64).unwrap_or(-1),
            outcome = %entry.outcome,
            "Audit entry"
        );
    }
}

/// Sink backed by the `gateway_audit_log` table.
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: PgPool,
}

impl PgAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLog for PgAuditLog {
    async fn append(&self, entry: AuditEntry) {
        let result = sqlx::query(
            r#"
            INSERT INTO gateway_audit_log (
                kind, reference, endpoint, request, response, status_code, outcome, at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(&entry.reference)
        .bind(&entry.endpoint)
        .bind(&entry.request)
        .bind(&entry.response)
        .bind(entry.status_code.map(|c| c as i32))
        .bind(&entry.outcome)
        .bind(entry.at)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(error = %e, kind = entry.kind.as_str(), "Audit insert failed");
            // Keep the entry in the log stream at least.
            TracingAuditLog.append(entry).await;
        }
    }
}
