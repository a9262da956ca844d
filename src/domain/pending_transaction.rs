//! Pending virtual-account payment requests.
//!
//! A `PendingTransaction` is created when a student initializes a payment
//! and a virtual account is issued for it. It transitions at most once out
//! of `pending` and is retained forever as the root of traceability for
//! every later ledger mutation.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a pending transaction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PendingStatus {
    /// Virtual account issued, waiting for the bank transfer.
    Pending,
    /// Credit received and reconciled.
    Successful,
    /// Gateway reported the transfer failed.
    Failed,
    /// A previously successful credit was reversed by the gateway.
    Reversed,
    /// Expiry passed without any credit arriving.
    Expired,
}

impl std::fmt::Display for PendingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PendingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingStatus::Pending => "pending",
            PendingStatus::Successful => "successful",
            PendingStatus::Failed => "failed",
            PendingStatus::Reversed => "reversed",
            PendingStatus::Expired => "expired",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PendingStatus::Pending),
            "successful" => Some(PendingStatus::Successful),
            "failed" => Some(PendingStatus::Failed),
            "reversed" => Some(PendingStatus::Reversed),
            "expired" => Some(PendingStatus::Expired),
            _ => None,
        }
    }

    /// Valid transitions out of this status.
    ///
    /// Everything except `successful -> reversed` is a single step out of
    /// `pending`; all other statuses are terminal.
    pub fn valid_transitions(&self) -> &'static [PendingStatus] {
        match self {
            PendingStatus::Pending => &[
                PendingStatus::Successful,
                PendingStatus::Failed,
                PendingStatus::Expired,
            ],
            PendingStatus::Successful => &[PendingStatus::Reversed],
            PendingStatus::Failed | PendingStatus::Reversed | PendingStatus::Expired => &[],
        }
    }

    pub fn can_transition_to(&self, target: PendingStatus) -> bool {
        self.valid_transitions().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PendingStatus::Pending)
    }
}

/// A locally-issued virtual-account payment request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingTransaction {
    /// Globally unique reference, the idempotency key for reconciliation.
    pub reference: String,
    pub user_id: Uuid,
    pub enrollment_id: Option<Uuid>,
    pub course_id: Option<Uuid>,
    /// Expected amount for this request.
    pub amount: BigDecimal,
    pub currency: String,
    /// Gateway-issued account the student pays into.
    pub account_number: String,
    pub bank_name: String,
    pub account_name: String,
    /// Gateway-side identifier of the virtual account.
    pub gateway_account_id: String,
    pub status: PendingStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PendingTransaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        reference: String,
        user_id: Uuid,
        enrollment_id: Option<Uuid>,
        course_id: Option<Uuid>,
        amount: BigDecimal,
        currency: String,
        account_number: String,
        bank_name: String,
        account_name: String,
        gateway_account_id: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            reference,
            user_id,
            enrollment_id,
            course_id,
            amount,
            currency,
            account_number,
            bank_name,
            account_name,
            gateway_account_id,
            status: PendingStatus::Pending,
            expires_at,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

/// Generate a new payment reference.
pub fn generate_reference() -> String {
    format!("LGP-{}", Uuid::new_v4().simple())
}
