//! Typed webhook payloads and the event-type map.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::gateway::{GatewayTxStatus, VerifiedTransaction};

/// Raw notification body: `{event, data: {...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    /// Our payment reference; some gateway event families call it `tx_ref`.
    #[serde(default, alias = "tx_ref")]
    pub reference: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Option<String>,
    /// Gateway-side transaction id.
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub sender_phone: Option<String>,
    #[serde(default)]
    pub narration: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// What the engine should do with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// `transaction.successful` or `virtualaccount.credit`.
    Credit,
    /// `transaction.failed`.
    Failed,
    /// `transaction.reversed`.
    Reversed,
    /// Anything else: acknowledged and ignored.
    Unrecognized,
}

impl EventKind {
    pub fn from_event(event: &str) -> Self {
        match event {
            "transaction.successful" | "virtualaccount.credit" => EventKind::Credit,
            "transaction.failed" => EventKind::Failed,
            "transaction.reversed" => EventKind::Reversed,
            _ => EventKind::Unrecognized,
        }
    }
}

/// A resolved gateway event, the single input shape the engine consumes
/// whether it arrived over the webhook or from a poll.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub kind: EventKind,
    pub reference: Option<String>,
    pub account_number: Option<String>,
    pub amount: BigDecimal,
    pub currency: Option<String>,
    pub gateway_transaction_id: Option<String>,
    pub sender_phone: Option<String>,
    pub narration: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl WebhookPayload {
    pub fn into_event(self) -> GatewayEvent {
        GatewayEvent {
            kind: EventKind::from_event(&self.event),
            reference: self.data.reference,
            account_number: self.data.account_number,
            amount: self.data.amount,
            currency: self.data.currency,
            gateway_transaction_id: self.data.id.map(|id| id.to_string()),
            sender_phone: self.data.sender_phone,
            narration: self.data.narration,
            occurred_at: self.data.created_at,
        }
    }
}

impl GatewayEvent {
    /// Build the equivalent event from an active `verifyTransaction` call,
    /// so polled confirmations flow through the exact same path as
    /// webhook deliveries.
    pub fn from_verification(verified: &VerifiedTransaction) -> Self {
        let kind = match verified.status {
            GatewayTxStatus::Successful => EventKind::Credit,
            GatewayTxStatus::Failed => EventKind::Failed,
            GatewayTxStatus::Reversed => EventKind::Reversed,
            GatewayTxStatus::Pending | GatewayTxStatus::Unknown => EventKind::Unrecognized,
        };
        GatewayEvent {
            kind,
            reference: Some(verified.reference.clone()),
            account_number: None,
            amount: verified.amount.clone(),
            currency: verified.currency.clone(),
            gateway_transaction_id: Some(verified.gateway_transaction_id.to_string()),
            sender_phone: None,
            narration: None,
            occurred_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_event_type_map() {
        assert_eq!(EventKind::from_event("transaction.successful"), EventKind::Credit);
        assert_eq!(EventKind::from_event("virtualaccount.credit"), EventKind::Credit);
        assert_eq!(EventKind::from_event("transaction.failed"), EventKind::Failed);
        assert_eq!(EventKind::from_event("transaction.reversed"), EventKind::Reversed);
        assert_eq!(EventKind::from_event("customer.created"), EventKind::Unrecognized);
    }

    #[test]
    fn test_payload_parse_with_tx_ref_alias() {
        let body = r#"
        {
            "event": "virtualaccount.credit",
            "data": {
                "tx_ref": "LGP-abc",
                "account_number": "9901234567",
                "amount": 350,
                "id": 777001,
                "sender_phone": "+2348012345678",
                "narration": "course fees"
            }
        }"#;
        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        let event = payload.into_event();
        assert_eq!(event.kind, EventKind::Credit);
        assert_eq!(event.reference.as_deref(), Some("LGP-abc"));
        assert_eq!(event.amount, BigDecimal::from(350));
        assert_eq!(event.gateway_transaction_id.as_deref(), Some("777001"));
    }

    #[test]
    fn test_payload_parse_with_reference_key() {
        let body = r#"{"event":"transaction.failed","data":{"reference":"LGP-x","amount":"10.50"}}"#;
        let payload: WebhookPayload = serde_json::from_str(body).unwrap();
        assert_eq!(payload.data.reference.as_deref(), Some("LGP-x"));
        assert_eq!(payload.data.amount, BigDecimal::from_str("10.50").unwrap());
    }
}
