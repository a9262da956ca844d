//! Canonical payment records.
//!
//! Exactly one `PaymentRecord` exists per reconciled transaction; the
//! transaction reference doubles as the idempotency key and carries a
//! uniqueness constraint in storage. Completed records are immutable
//! except for the refund transition.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
    Cancelled,
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "refunded" => Some(PaymentStatus::Refunded),
            "cancelled" => Some(PaymentStatus::Cancelled),
            _ => None,
        }
    }

    /// Only a completed record may move, and only to refunded.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Completed, PaymentStatus::Refunded)
        )
    }
}

/// How the money arrived. This subsystem only settles bank transfers into
/// gateway-issued virtual accounts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    BankTransfer,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::BankTransfer => "bank_transfer",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub record_id: Uuid,
    /// Foreign key to the pending transaction; unique.
    pub reference: String,
    /// Payment plan credited by this record. Absent for orphan credits
    /// held for manual review.
    pub plan_id: Option<Uuid>,
    /// Amount actually received, not the amount expected.
    pub amount: BigDecimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Set when the credit needs a human look: below tolerance, or no
    /// plan to apply it to. Flagged credits are still credited.
    pub requires_review: bool,
    pub gateway_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn completed(
        reference: String,
        plan_id: Option<Uuid>,
        amount: BigDecimal,
        currency: String,
        gateway_transaction_id: Option<String>,
        requires_review: bool,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            reference,
            plan_id,
            amount,
            currency,
            method: PaymentMethod::BankTransfer,
            status: PaymentStatus::Completed,
            requires_review,
            gateway_transaction_id,
            created_at: Utc::now(),
        }
    }
}
