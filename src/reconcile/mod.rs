//! Reconciliation engine.
//!
//! Turns a resolved gateway event into ledger mutations. This is the
//! highest-stakes code in the service: every transition out of `pending`
//! must happen exactly once no matter how many times the gateway delivers
//! the event, and a credit is only visible once its payment record is
//! durably written. Webhook deliveries and poll results both land here,
//! so there is a single settlement path with two triggers.

use std::sync::Arc;

use bigdecimal::BigDecimal;
use tracing::{debug, info, instrument, warn};

use crate::audit::{AuditEntry, AuditKind, AuditLog};
use crate::domain::{AccessPolicy, PendingStatus, PendingTransaction, PlanStatus};
use crate::error::AppError;
use crate::gateway::{GatewayTxStatus, TransactionVerifier};
use crate::notify::{NotificationSender, PaymentNotification};
use crate::store::{
    CreditCommand, CreditOutcome, PaymentLedgerRepo, PendingTransactionRepo, StoreError,
};
use crate::webhook::{EventKind, GatewayEvent};

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    /// Accept a credit cleanly when `received >= expected * pct / 100`.
    /// Anything below is still credited but flagged for manual review.
    pub amount_tolerance_percent: u32,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            amount_tolerance_percent: 99,
        }
    }
}

impl ReconcileConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.amount_tolerance_percent = std::env::var("AMOUNT_TOLERANCE_PERCENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.amount_tolerance_percent);
        cfg
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What happened to an event. Duplicates and unknown references are
/// normal outcomes here, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Credited {
        reference: String,
        requires_review: bool,
        content_unlocked_now: bool,
    },
    /// The transaction had already left `pending`; the event is a no-op.
    AlreadyProcessed {
        reference: String,
    },
    MarkedFailed {
        reference: String,
    },
    Reversed {
        reference: String,
    },
    /// No pending transaction matched; logged and dropped.
    NoMatch,
    /// Unrecognized event type; acknowledged and ignored.
    Ignored,
}

// ============================================================================
// Engine
// ============================================================================

pub struct ReconciliationEngine {
    pending: Arc<dyn PendingTransactionRepo>,
    ledger: Arc<dyn PaymentLedgerRepo>,
    audit: Arc<dyn AuditLog>,
    notifications: NotificationSender,
    policy: AccessPolicy,
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(
        pending: Arc<dyn PendingTransactionRepo>,
        ledger: Arc<dyn PaymentLedgerRepo>,
        audit: Arc<dyn AuditLog>,
        notifications: NotificationSender,
        policy: AccessPolicy,
        config: ReconcileConfig,
    ) -> Self {
        Self {
            pending,
            ledger,
            audit,
            notifications,
            policy,
            config,
        }
    }

    /// Settle one gateway event.
    #[instrument(skip(self, event), fields(kind = ?event.kind, reference = event.reference.as_deref().unwrap_or("-")))]
    pub async fn process_event(&self, event: GatewayEvent) -> Result<ReconcileOutcome, StoreError> {
        if event.kind == EventKind::Unrecognized {
            debug!("Unrecognized event type, acknowledging and ignoring");
            return Ok(ReconcileOutcome::Ignored);
        }

        let Some(pending) = self.resolve(&event).await? else {
            warn!(
                account_number = event.account_number.as_deref().unwrap_or("-"),
                amount = %event.amount,
                "No pending transaction matches event, dropping"
            );
            self.audit
                .append(AuditEntry::webhook(
                    AuditKind::WebhookDropped,
                    event.reference.clone(),
                    "no matching pending transaction",
                ))
                .await;
            return Ok(ReconcileOutcome::NoMatch);
        };

        match event.kind {
            EventKind::Credit => self.apply_credit(&pending, &event).await,
            EventKind::Failed => self.apply_failure(&pending).await,
            EventKind::Reversed => self.apply_reversal(&pending).await,
            EventKind::Unrecognized => Ok(ReconcileOutcome::Ignored),
        }
    }

    /// Find the pending transaction an event belongs to: by reference
    /// first, else the most recent `pending` request for the credited
    /// account number.
    async fn resolve(
        &self,
        event: &GatewayEvent,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        if let Some(reference) = event.reference.as_deref() {
            if let Some(tx) = self.pending.find_by_reference(reference).await? {
                return Ok(Some(tx));
            }
        }
        if let Some(account_number) = event.account_number.as_deref() {
            return self.pending.find_pending_by_account(account_number).await;
        }
        Ok(None)
    }

    async fn apply_credit(
        &self,
        pending: &PendingTransaction,
        event: &GatewayEvent,
    ) -> Result<ReconcileOutcome, StoreError> {
        if pending.status != PendingStatus::Pending {
            debug!(
                reference = %pending.reference,
                status = %pending.status,
                "Credit for a settled transaction, absorbing duplicate"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed {
                reference: pending.reference.clone(),
            });
        }

        let within_tolerance =
            within_tolerance(&self.config, &pending.amount, &event.amount);
        if !within_tolerance {
            // Money moved, so it is credited regardless, just not quietly.
            warn!(
                reference = %pending.reference,
                expected = %pending.amount,
                received = %event.amount,
                "Received amount below tolerance, flagging for review"
            );
        }

        let credit = CreditCommand {
            reference: pending.reference.clone(),
            enrollment_id: pending.enrollment_id,
            amount: event.amount.clone(),
            currency: event
                .currency
                .clone()
                .unwrap_or_else(|| pending.currency.clone()),
            gateway_transaction_id: event.gateway_transaction_id.clone(),
            requires_review: !within_tolerance,
        };

        match self.ledger.commit_credit(&credit, &self.policy).await? {
            CreditOutcome::AlreadyProcessed => {
                debug!(reference = %pending.reference, "Lost the settlement race, no-op");
                Ok(ReconcileOutcome::AlreadyProcessed {
                    reference: pending.reference.clone(),
                })
            }
            CreditOutcome::Applied(applied) => {
                let plan_completed = applied
                    .plan
                    .as_ref()
                    .map(|p| p.status == PlanStatus::Completed)
                    .unwrap_or(false);
                info!(
                    reference = %pending.reference,
                    amount = %applied.record.amount,
                    requires_review = applied.record.requires_review,
                    plan_completed,
                    content_unlocked_now = applied.content_unlocked_now,
                    "Credit reconciled"
                );
                self.audit
                    .append(AuditEntry::transition(
                        &pending.reference,
                        format!(
                            "pending -> successful (credited {}, review={})",
                            applied.record.amount, applied.record.requires_review
                        ),
                    ))
                    .await;

                // Post-commit, off the financial path.
                self.notifications
                    .fire_and_forget(PaymentNotification::PaymentReceived {
                        user_id: pending.user_id,
                        reference: pending.reference.clone(),
                        amount: applied.record.amount.clone(),
                        currency: applied.record.currency.clone(),
                        plan_completed,
                        content_unlocked: applied.content_unlocked_now,
                    });

                Ok(ReconcileOutcome::Credited {
                    reference: pending.reference.clone(),
                    requires_review: applied.record.requires_review,
                    content_unlocked_now: applied.content_unlocked_now,
                })
            }
        }
    }

    async fn apply_failure(
        &self,
        pending: &PendingTransaction,
    ) -> Result<ReconcileOutcome, StoreError> {
        let flipped = self
            .pending
            .transition(
                &pending.reference,
                PendingStatus::Pending,
                PendingStatus::Failed,
            )
            .await?;
        if !flipped {
            return Ok(ReconcileOutcome::AlreadyProcessed {
                reference: pending.reference.clone(),
            });
        }

        info!(reference = %pending.reference, "Transaction marked failed");
        self.audit
            .append(AuditEntry::transition(&pending.reference, "pending -> failed"))
            .await;
        self.notifications
            .fire_and_forget(PaymentNotification::PaymentFailed {
                user_id: pending.user_id,
                reference: pending.reference.clone(),
            });

        Ok(ReconcileOutcome::MarkedFailed {
            reference: pending.reference.clone(),
        })
    }

    /// Conservative reversal: the record flips to refunded, the ledger
    /// and enrollment access are left alone for manual reconciliation.
    async fn apply_reversal(
        &self,
        pending: &PendingTransaction,
    ) -> Result<ReconcileOutcome, StoreError> {
        let flipped = self
            .pending
            .transition(
                &pending.reference,
                PendingStatus::Successful,
                PendingStatus::Reversed,
            )
            .await?;
        if !flipped {
            debug!(
                reference = %pending.reference,
                status = %pending.status,
                "Reversal for a transaction that is not successful, no-op"
            );
            return Ok(ReconcileOutcome::AlreadyProcessed {
                reference: pending.reference.clone(),
            });
        }

        let refunded = self.ledger.mark_record_refunded(&pending.reference).await?;
        if !refunded {
            warn!(
                reference = %pending.reference,
                "Reversed transaction has no refundable payment record"
            );
        }
        info!(reference = %pending.reference, "Transaction reversed, record refunded");
        self.audit
            .append(AuditEntry::transition(
                &pending.reference,
                "successful -> reversed (record refunded, ledger untouched)",
            ))
            .await;

        Ok(ReconcileOutcome::Reversed {
            reference: pending.reference.clone(),
        })
    }

}

/// `received >= expected * pct / 100`, in scaled integer arithmetic so no
/// float rounding can move the boundary.
fn within_tolerance(
    config: &ReconcileConfig,
    expected: &BigDecimal,
    received: &BigDecimal,
) -> bool {
    received * BigDecimal::from(100)
        >= expected * BigDecimal::from(config.amount_tolerance_percent)
}

// ============================================================================
// Poll-reconciler
// ============================================================================

/// Result of an on-demand or scheduled status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    NotFound,
    /// Local record is already terminal; the gateway was not queried.
    AlreadyFinal(PendingStatus),
    /// Gateway still reports the transaction as unsettled.
    GatewayPending,
    Reconciled(ReconcileOutcome),
}

/// Actively queries the gateway for transactions whose webhook never
/// arrived and feeds confirmed results through the engine.
pub struct PollReconciler {
    pending: Arc<dyn PendingTransactionRepo>,
    verifier: Arc<dyn TransactionVerifier>,
    engine: Arc<ReconciliationEngine>,
}

impl PollReconciler {
    pub fn new(
        pending: Arc<dyn PendingTransactionRepo>,
        verifier: Arc<dyn TransactionVerifier>,
        engine: Arc<ReconciliationEngine>,
    ) -> Self {
        Self {
            pending,
            verifier,
            engine,
        }
    }

    #[instrument(skip(self))]
    pub async fn check_payment_status(&self, reference: &str) -> Result<CheckResult, AppError> {
        let Some(tx) = self.pending.find_by_reference(reference).await? else {
            return Ok(CheckResult::NotFound);
        };
        if tx.status.is_terminal() {
            return Ok(CheckResult::AlreadyFinal(tx.status));
        }

        // The outbound call happens before any ledger lock is taken.
        let verified = self.verifier.verify_transaction(reference).await?;
        if matches!(
            verified.status,
            GatewayTxStatus::Pending | GatewayTxStatus::Unknown
        ) {
            return Ok(CheckResult::GatewayPending);
        }

        let event = GatewayEvent::from_verification(&verified);
        let outcome = self.engine.process_event(event).await?;
        Ok(CheckResult::Reconciled(outcome))
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
    fn test_tolerance_boundary() {
        let config = ReconcileConfig {
            amount_tolerance_percent: 99,
        };
        let expected = decimal("1000");

        assert!(within_tolerance(&config, &expected, &decimal("1000")));
        assert!(within_tolerance(&config, &expected, &decimal("990")));
        assert!(!within_tolerance(&config, &expected, &decimal("989.99")));
        assert!(!within_tolerance(&config, &expected, &decimal("989")));
        assert!(within_tolerance(&config, &expected, &decimal("1200")));
    }

    #[test]
    fn test_tolerance_with_fractional_expected() {
        let config = ReconcileConfig {
            amount_tolerance_percent: 99,
        };
        // 99% of 100.50 is 99.495.
        let expected = decimal("100.50");
        assert!(within_tolerance(&config, &expected, &decimal("99.495")));
        assert!(!within_tolerance(&config, &expected, &decimal("99.49")));
    }
}
