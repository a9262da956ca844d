//! HTTP client for the bank-transfer payment gateway.
//!
//! Calls are synchronous request/response with a bounded timeout and
//! bearer-token auth. The client holds no local state and never retries;
//! retry policy belongs to callers. Every call and its outcome lands in
//! the audit log, success or not.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::audit::{AuditEntry, AuditLog};
use crate::config::GatewayConfig;

use super::types::{
    Balance, Bank, CreateVirtualAccountRequest, Envelope, GatewayError, TransactionFilters,
    TransactionSummary, VerifiedTransaction, VirtualAccount,
};

/// Seam for the one gateway call the poll-reconciler depends on, so the
/// sweeper path can be exercised without the network.
#[async_trait]
pub trait TransactionVerifier: Send + Sync {
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError>;
}

pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
    audit: Arc<dyn AuditLog>,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig, audit: Arc<dyn AuditLog>) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;
        Ok(Self {
            http,
            config,
            audit,
        })
    }

    pub async fn create_virtual_account(
        &self,
        reference: &str,
        account_name: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<VirtualAccount, GatewayError> {
        let body = CreateVirtualAccountRequest {
            reference: reference.to_string(),
            account_name: account_name.to_string(),
            metadata,
        };
        let summary = serde_json::to_value(&body).ok();
        let builder = self
            .http
            .request(Method::POST, self.url("/virtual-accounts"))
            .json(&body);
        self.execute("POST /virtual-accounts", Some(reference), summary, builder)
            .await
    }

    pub async fn get_virtual_account(
        &self,
        account_id: &str,
    ) -> Result<VirtualAccount, GatewayError> {
        let builder = self
            .http
            .request(Method::GET, self.url(&format!("/virtual-accounts/{account_id}")));
        self.execute("GET /virtual-accounts/{id}", None, None, builder)
            .await
    }

    pub async fn get_transaction(
        &self,
        gateway_transaction_id: i64,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let builder = self.http.request(
            Method::GET,
            self.url(&format!("/transactions/{gateway_transaction_id}")),
        );
        self.execute("GET /transactions/{id}", None, None, builder)
            .await
    }

    pub async fn list_transactions(
        &self,
        filters: &TransactionFilters,
    ) -> Result<Vec<TransactionSummary>, GatewayError> {
        let builder = self
            .http
            .request(Method::GET, self.url("/transactions"))
            .query(filters);
        self.execute("GET /transactions", None, serde_json::to_value(filters).ok(), builder)
            .await
    }

    pub async fn list_banks(&self) -> Result<Vec<Bank>, GatewayError> {
        let builder = self.http.request(Method::GET, self.url("/banks"));
        self.execute("GET /banks", None, None, builder).await
    }

    pub async fn get_balance(&self) -> Result<Balance, GatewayError> {
        let builder = self.http.request(Method::GET, self.url("/balance"));
        self.execute("GET /balance", None, None, builder).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Run one call: send, record the audit entry, map the outcome.
    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        reference: Option<&str>,
        request_summary: Option<serde_json::Value>,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        debug!(endpoint = %endpoint, "Calling payment gateway");

        let sent = builder
            .bearer_auth(&self.config.secret_key)
            .send()
            .await;

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let err = GatewayError::Network(e.to_string());
                self.record(endpoint, reference, request_summary, None, None, err.kind())
                    .await;
                return Err(err);
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let err = GatewayError::Network(e.to_string());
                self.record(
                    endpoint,
                    reference,
                    request_summary,
                    None,
                    Some(status.as_u16()),
                    err.kind(),
                )
                .await;
                return Err(err);
            }
        };

        let mapped = Self::map_response(status, &text);
        let outcome = match &mapped {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        self.record(
            endpoint,
            reference,
            request_summary,
            Some(text),
            Some(status.as_u16()),
            outcome,
        )
        .await;
        mapped
    }

    fn map_response<T: DeserializeOwned>(
        status: StatusCode,
        text: &str,
    ) -> Result<T, GatewayError> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(GatewayError::Authentication(status.to_string()));
            }
            StatusCode::TOO_MANY_REQUESTS => return Err(GatewayError::RateLimited),
            s if !s.is_success() => {
                return Err(GatewayError::Gateway {
                    status: s.as_u16(),
                    message: text.chars().take(256).collect(),
                });
            }
            _ => {}
        }

        let envelope: Envelope<T> = serde_json::from_str(text)
            .map_err(|e| GatewayError::MalformedResponse(e.to_string()))?;
        if envelope.status != "success" {
            return Err(GatewayError::Gateway {
                status: status.as_u16(),
                message: envelope
                    .message
                    .unwrap_or_else(|| "gateway reported failure".to_string()),
            });
        }
        envelope
            .data
            .ok_or_else(|| GatewayError::MalformedResponse("missing data field".to_string()))
    }

    async fn record(
        &self,
        endpoint: &str,
        reference: Option<&str>,
        request: Option<serde_json::Value>,
        response: Option<String>,
        status_code: Option<u16>,
        outcome: &str,
    ) {
        self.audit
            .append(AuditEntry::gateway_call(
                endpoint.to_string(),
                reference.map(str::to_string),
                request,
                response,
                status_code,
                outcome.to_string(),
            ))
            .await;
    }
}

#[async_trait]
impl TransactionVerifier for GatewayClient {
    async fn verify_transaction(
        &self,
        reference: &str,
    ) -> Result<VerifiedTransaction, GatewayError> {
        let builder = self.http.request(
            Method::GET,
            self.url(&format!("/transactions/verify/{reference}")),
        );
        self.execute(
            "GET /transactions/verify/{reference}",
            Some(reference),
            None,
            builder,
        )
        .await
    }
}
