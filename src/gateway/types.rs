//! Wire types and error taxonomy for the payment gateway.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tagged failure kinds for gateway calls.
///
/// The client never retries on its own; callers pick a policy off
/// `is_retryable`.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {0}")]
    Network(String),

    #[error("gateway rejected credentials: {0}")]
    Authentication(String),

    #[error("gateway rate limit hit")]
    RateLimited,

    #[error("gateway error (status {status}): {message}")]
    Gateway { status: u16, message: String },

    #[error("malformed gateway response: {0}")]
    MalformedResponse(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Network(_) | GatewayError::RateLimited)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Network(_) => "network",
            GatewayError::Authentication(_) => "authentication",
            GatewayError::RateLimited => "rate_limited",
            GatewayError::Gateway { .. } => "gateway_error",
            GatewayError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Standard `{status, message, data}` envelope on gateway responses.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateVirtualAccountRequest {
    pub reference: String,
    pub account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// A gateway-issued virtual account dedicated to one expected payment.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VirtualAccount {
    pub account_id: String,
    pub account_number: String,
    pub bank_name: String,
    pub account_name: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GatewayTxStatus {
    Pending,
    Successful,
    Failed,
    Reversed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifiedTransaction {
    pub reference: String,
    pub status: GatewayTxStatus,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(rename = "id")]
    pub gateway_transaction_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionSummary {
    pub reference: String,
    pub status: GatewayTxStatus,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(rename = "id")]
    pub gateway_transaction_id: i64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Filters for `GET /transactions`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransactionFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    pub available: BigDecimal,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bank {
    pub code: String,
    pub name: String,
}
