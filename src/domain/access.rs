//! Access and certificate gating decisions.
//!
//! Pure policy over `(total_paid, total_fee)`. Thresholds are business
//! policy and come from configuration, never literals at call sites.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};

/// Percentage thresholds applied when a payment lands.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AccessPolicy {
    /// Content unlocks once this share of the fee has been paid.
    pub content_unlock_percent: u32,
    /// The certificate block lifts once this share has been paid.
    pub certificate_release_percent: u32,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            content_unlock_percent: 30,
            certificate_release_percent: 100,
        }
    }
}

/// Outcome of an access re-evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessDecision {
    pub unlock_content_access: bool,
    pub release_certificate_block: bool,
}

impl AccessPolicy {
    /// Evaluate the gates for the given ledger totals.
    ///
    /// `already_unlocked` feeds the one-way content unlock: once an
    /// enrollment is open it stays open no matter what later bookkeeping
    /// does to the totals.
    pub fn evaluate(
        &self,
        total_paid: &BigDecimal,
        total_fee: &BigDecimal,
        already_unlocked: bool,
    ) -> AccessDecision {
        if total_fee <= &BigDecimal::zero() {
            // Free or zero-fee plan: nothing to gate on.
            return AccessDecision {
                unlock_content_access: true,
                release_certificate_block: true,
            };
        }

        let paid_x100 = total_paid * BigDecimal::from(100);
        let unlock = already_unlocked
            || paid_x100 >= total_fee * BigDecimal::from(self.content_unlock_percent);
        let release = paid_x100 >= total_fee * BigDecimal::from(self.certificate_release_percent);

        AccessDecision {
            unlock_content_access: unlock,
            release_certificate_block: release,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn decimal(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_unlock_at_thirty_percent() {
        let policy = AccessPolicy::default();
        let fee = decimal("1000");

        let below = policy.evaluate(&decimal("299"), &fee, false);
        assert!(!below.unlock_content_access);

        let at = policy.evaluate(&decimal("300"), &fee, false);
        assert!(at.unlock_content_access);
        assert!(!at.release_certificate_block);
    }

    #[test]
    fn test_certificate_released_only_when_fully_paid() {
        let policy = AccessPolicy::default();
        let fee = decimal("1000");

        let almost = policy.evaluate(&decimal("999.99"), &fee, false);
        assert!(!almost.release_certificate_block);

        let full = policy.evaluate(&decimal("1000"), &fee, false);
        assert!(full.release_certificate_block);

        let over = policy.evaluate(&decimal("1200"), &fee, false);
        assert!(over.release_certificate_block);
    }

    #[test]
    fn test_unlock_is_one_way() {
        let policy = AccessPolicy::default();
        let fee = decimal("1000");

        // Totals below the threshold but previously unlocked: stays open.
        let decision = policy.evaluate(&decimal("100"), &fee, true);
        assert!(decision.unlock_content_access);
    }

    #[test]
    fn test_zero_fee_plan_is_open() {
        let policy = AccessPolicy::default();
        let decision = policy.evaluate(&BigDecimal::from(0), &BigDecimal::from(0), false);
        assert!(decision.unlock_content_access);
        assert!(decision.release_certificate_block);
    }

    #[test]
    fn test_custom_thresholds() {
        let policy = AccessPolicy {
            content_unlock_percent: 50,
            certificate_release_percent: 100,
        };
        let fee = decimal("200");
        assert!(!policy.evaluate(&decimal("99"), &fee, false).unlock_content_access);
        assert!(policy.evaluate(&decimal("100"), &fee, false).unlock_content_access);
    }
}
