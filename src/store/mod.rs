//! Repository interfaces for reconciliation state.
//!
//! The engine talks to storage only through these traits so it can be
//! exercised without a live database. `postgres` holds the production
//! implementations; `memory` holds the in-process implementations used by
//! the integration tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AccessDecision, AccessPolicy, PaymentPlan, PaymentRecord, PendingStatus, PendingTransaction,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored value could not be decoded: {0}")]
    Decode(String),

    #[error("ledger conflict: {0}")]
    Conflict(String),
}

/// Instruction to apply one reconciled credit to the ledger.
#[derive(Debug, Clone)]
pub struct CreditCommand {
    /// Reference of the pending transaction being settled.
    pub reference: String,
    pub enrollment_id: Option<Uuid>,
    /// Amount actually received. Credited as-is, never the expected amount.
    pub amount: BigDecimal,
    pub currency: String,
    pub gateway_transaction_id: Option<String>,
    pub requires_review: bool,
}

/// Result of a successfully committed credit unit.
#[derive(Debug, Clone)]
pub struct AppliedCredit {
    pub record: PaymentRecord,
    /// Plan state after the credit. Absent for orphan credits.
    pub plan: Option<PaymentPlan>,
    pub decision: Option<AccessDecision>,
    /// True when this credit crossed the content-unlock threshold for the
    /// first time.
    pub content_unlocked_now: bool,
}

#[derive(Debug, Clone)]
pub enum CreditOutcome {
    Applied(Box<AppliedCredit>),
    /// The pending transaction had already left `pending`, or a record for
    /// the reference already existed. Nothing was written.
    AlreadyProcessed,
}

/// Durable store of issued virtual-account payment requests.
#[async_trait]
pub trait PendingTransactionRepo: Send + Sync {
    async fn insert(&self, tx: &PendingTransaction) -> Result<(), StoreError>;

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PendingTransaction>, StoreError>;

    /// Most recent `pending` request for a virtual account number.
    async fn find_pending_by_account(
        &self,
        account_number: &str,
    ) -> Result<Option<PendingTransaction>, StoreError>;

    /// Guarded compare-and-swap on status. Returns `false` when the row
    /// was not in `from`, which callers treat as a duplicate delivery.
    async fn transition(
        &self,
        reference: &str,
        from: PendingStatus,
        to: PendingStatus,
    ) -> Result<bool, StoreError>;

    /// Expire every `pending` transaction whose expiry passed, up to
    /// `limit` rows. Returns the expired references. Rows in any other
    /// status are never touched.
    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, StoreError>;

    /// `pending` transactions older than `older_than` that may have missed
    /// their webhook and should be re-queried at the gateway.
    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingTransaction>, StoreError>;
}

/// Payment records, payment plans, and the enrollment flags written
/// through with them.
#[async_trait]
pub trait PaymentLedgerRepo: Send + Sync {
    /// Apply one credit as a single atomic unit: flip the pending
    /// transaction out of `pending`, insert the payment record, update
    /// the plan ledger, and write the enrollment flags. Either all of it
    /// lands or none of it does. The uniqueness constraint on the record
    /// reference is the final idempotency backstop.
    async fn commit_credit(
        &self,
        credit: &CreditCommand,
        policy: &AccessPolicy,
    ) -> Result<CreditOutcome, StoreError>;

    /// Flip a completed record to refunded. Returns `false` when no
    /// record exists or it was not in a refundable state.
    async fn mark_record_refunded(&self, reference: &str) -> Result<bool, StoreError>;

    async fn find_record_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError>;

    async fn find_plan_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<PaymentPlan>, StoreError>;

    /// Fresh certificate-gate check computed from the plan balance, never
    /// from a cached flag. `None` when the enrollment has no plan.
    async fn is_certificate_blocked(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<bool>, StoreError>;
}
