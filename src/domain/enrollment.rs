//! Enrollment flags owned elsewhere but written through by reconciliation.
//!
//! The enrollment entity itself lives with the course subsystem; this
//! module types only the fields the reconciliation unit mutates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse enrollment state. Reconciliation only ever moves this forward
/// from `pending_payment` to `in_progress`, never back.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    PendingPayment,
    InProgress,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentStatus::PendingPayment => "pending_payment",
            EnrollmentStatus::InProgress => "in_progress",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending_payment" => Some(EnrollmentStatus::PendingPayment),
            "in_progress" => Some(EnrollmentStatus::InProgress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentPaymentStatus {
    Pending,
    Completed,
}

impl EnrollmentPaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnrollmentPaymentStatus::Pending => "pending",
            EnrollmentPaymentStatus::Completed => "completed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(EnrollmentPaymentStatus::Pending),
            "completed" => Some(EnrollmentPaymentStatus::Completed),
            _ => None,
        }
    }
}

/// The slice of an enrollment this subsystem reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnrollmentFlags {
    pub enrollment_id: Uuid,
    pub payment_status: EnrollmentPaymentStatus,
    pub certificate_blocked: bool,
    pub status: EnrollmentStatus,
}

impl EnrollmentFlags {
    /// Flags for a freshly created enrollment with nothing paid.
    pub fn initial(enrollment_id: Uuid) -> Self {
        Self {
            enrollment_id,
            payment_status: EnrollmentPaymentStatus::Pending,
            certificate_blocked: true,
            status: EnrollmentStatus::PendingPayment,
        }
    }
}
