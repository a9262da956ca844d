//! Per-enrollment payment plan ledger.
//!
//! Tracks total fee against total paid for one enrollment and derives the
//! plan status and outstanding balance. `total_paid` only ever grows;
//! refunds are handled by marking the payment record and leaving the plan
//! for manual reconciliation.

use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Partial,
    Completed,
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanStatus::Pending => "pending",
            PlanStatus::Partial => "partial",
            PlanStatus::Completed => "completed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "pending" => Some(PlanStatus::Pending),
            "partial" => Some(PlanStatus::Partial),
            "completed" => Some(PlanStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentPlan {
    pub plan_id: Uuid,
    pub enrollment_id: Uuid,
    pub total_fee: BigDecimal,
    pub total_paid: BigDecimal,
    pub currency: String,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentPlan {
    pub fn new(enrollment_id: Uuid, total_fee: BigDecimal, currency: String) -> Self {
        let now = Utc::now();
        Self {
            plan_id: Uuid::new_v4(),
            enrollment_id,
            total_fee,
            total_paid: BigDecimal::zero(),
            currency,
            status: PlanStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Outstanding balance, clamped at zero for overpayments.
    pub fn balance(&self) -> BigDecimal {
        let diff = &self.total_fee - &self.total_paid;
        if diff < BigDecimal::zero() {
            BigDecimal::zero()
        } else {
            diff
        }
    }

    /// Apply a received credit to the ledger.
    ///
    /// `status` is recomputed so that `completed` holds exactly when no
    /// balance remains.
    pub fn record_payment(&mut self, amount: &BigDecimal) {
        self.total_paid += amount;
        self.status = if self.total_paid >= self.total_fee {
            PlanStatus::Completed
        } else {
            PlanStatus::Partial
        };
        self.updated_at = Utc::now();
    }

    /// Paid share of the fee in percent, capped at 100.
    pub fn progress_percent(&self) -> BigDecimal {
        if self.total_fee <= BigDecimal::zero() {
            return BigDecimal::from(100);
        }
        let pct = &self.total_paid * BigDecimal::from(100) / &self.total_fee;
        if pct > BigDecimal::from(100) {
            BigDecimal::from(100)
        } else {
            pct
        }
    }

    /// Certificates are gated while any balance is outstanding.
    pub fn is_certificate_blocked(&self) -> bool {
        self.balance() > BigDecimal::zero()
    }

    /// Balance formatted for display, e.g. `NGN 650.00`.
    pub fn formatted_balance(&self) -> String {
        format!("{} {}", self.currency, self.balance().with_scale(2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn plan(fee: &str) -> PaymentPlan {
        PaymentPlan::new(
            Uuid::new_v4(),
            BigDecimal::from_str(fee).unwrap(),
            "NGN".to_string(),
        )
    }

    #[test]
    fn test_partial_then_completed() {
        let mut plan = plan("1000");
        plan.record_payment(&BigDecimal::from(350));
        assert_eq!(plan.total_paid, BigDecimal::from(350));
        assert_eq!(plan.balance(), BigDecimal::from(650));
        assert_eq!(plan.status, PlanStatus::Partial);
        assert!(plan.is_certificate_blocked());

        plan.record_payment(&BigDecimal::from(650));
        assert_eq!(plan.total_paid, BigDecimal::from(1000));
        assert_eq!(plan.balance(), BigDecimal::from(0));
        assert_eq!(plan.status, PlanStatus::Completed);
        assert!(!plan.is_certificate_blocked());
    }

    #[test]
    fn test_balance_never_negative() {
        let mut plan = plan("100");
        plan.record_payment(&BigDecimal::from(250));
        assert_eq!(plan.balance(), BigDecimal::from(0));
        assert_eq!(plan.status, PlanStatus::Completed);
    }

    #[test]
    fn test_completed_iff_zero_balance() {
        let mut plan = plan("500");
        for _ in 0..5 {
            plan.record_payment(&BigDecimal::from(100));
            let completed = plan.status == PlanStatus::Completed;
            let settled = plan.balance() == BigDecimal::from(0);
            assert_eq!(completed, settled);
        }
    }

    #[test]
    fn test_progress_percent_capped() {
        let mut plan = plan("1000");
        plan.record_payment(&BigDecimal::from(350));
        assert_eq!(plan.progress_percent(), BigDecimal::from(35));
        plan.record_payment(&BigDecimal::from(2000));
        assert_eq!(plan.progress_percent(), BigDecimal::from(100));
    }

    #[test]
    fn test_formatted_balance() {
        let mut plan = plan("1000");
        plan.record_payment(&BigDecimal::from(350));
        assert_eq!(plan.formatted_balance(), "NGN 650.00");
    }
}
