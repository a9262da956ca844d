//! Postgres repositories.
//!
//! Every transition out of `pending` is a compare-and-swap `UPDATE …
//! WHERE status = 'pending'`, so two concurrent deliveries for the same
//! reference settle into exactly one winner. The credit unit runs inside
//! a single transaction; `payment_records.reference UNIQUE` is the last
//! line of defense against double-crediting.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    AccessPolicy, EnrollmentStatus, PaymentMethod, PaymentPlan, PaymentRecord, PaymentStatus,
    PendingStatus, PendingTransaction, PlanStatus,
};

use super::{
    AppliedCredit, CreditCommand, CreditOutcome, PaymentLedgerRepo, PendingTransactionRepo,
    StoreError,
};

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct PendingRow {
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
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PendingRow {
    fn into_domain(self) -> Result<PendingTransaction, StoreError> {
        let status = PendingStatus::from_db_status(&self.status).ok_or_else(|| {
            StoreError::Decode(format!(
                "unknown pending transaction status '{}' for {}",
                self.status, self.reference
            ))
        })?;
        Ok(PendingTransaction {
            reference: self.reference,
            user_id: self.user_id,
            enrollment_id: self.enrollment_id,
            course_id: self.course_id,
            amount: self.amount,
            currency: self.currency,
            account_number: self.account_number,
            bank_name: self.bank_name,
            account_name: self.account_name,
            gateway_account_id: self.gateway_account_id,
            status,
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    record_id: Uuid,
    reference: String,
    plan_id: Option<Uuid>,
    amount: BigDecimal,
    currency: String,
    method: String,
    status: String,
    requires_review: bool,
    gateway_transaction_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl RecordRow {
    fn into_domain(self) -> Result<PaymentRecord, StoreError> {
        let status = PaymentStatus::from_db_status(&self.status).ok_or_else(|| {
            StoreError::Decode(format!("unknown payment record status '{}'", self.status))
        })?;
        let method = PaymentMethod::from_db_value(&self.method).ok_or_else(|| {
            StoreError::Decode(format!("unknown payment method '{}'", self.method))
        })?;
        Ok(PaymentRecord {
            record_id: self.record_id,
            reference: self.reference,
            plan_id: self.plan_id,
            amount: self.amount,
            currency: self.currency,
            method,
            status,
            requires_review: self.requires_review,
            gateway_transaction_id: self.gateway_transaction_id,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PlanRow {
    plan_id: Uuid,
    enrollment_id: Uuid,
    total_fee: BigDecimal,
    total_paid: BigDecimal,
    currency: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PlanRow {
    fn into_domain(self) -> Result<PaymentPlan, StoreError> {
        let status = PlanStatus::from_db_status(&self.status).ok_or_else(|| {
            StoreError::Decode(format!("unknown payment plan status '{}'", self.status))
        })?;
        Ok(PaymentPlan {
            plan_id: self.plan_id,
            enrollment_id: self.enrollment_id,
            total_fee: self.total_fee,
            total_paid: self.total_paid,
            currency: self.currency,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ============================================================================
// Pending transactions
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgPendingTransactionRepo {
    pool: PgPool,
}

impl PgPendingTransactionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PendingTransactionRepo for PgPendingTransactionRepo {
    async fn insert(&self, tx: &PendingTransaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pending_transactions (
                reference, user_id, enrollment_id, course_id, amount, currency,
                account_number, bank_name, account_name, gateway_account_id,
                status, expires_at, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(&tx.reference)
        .bind(tx.user_id)
        .bind(tx.enrollment_id)
        .bind(tx.course_id)
        .bind(&tx.amount)
        .bind(&tx.currency)
        .bind(&tx.account_number)
        .bind(&tx.bank_name)
        .bind(&tx.account_name)
        .bind(&tx.gateway_account_id)
        .bind(tx.status.as_str())
        .bind(tx.expires_at)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        let row = sqlx::query_as::<_, PendingRow>(
            "SELECT * FROM pending_transactions WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingRow::into_domain).transpose()
    }

    async fn find_pending_by_account(
        &self,
        account_number: &str,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        let row = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT * FROM pending_transactions
            WHERE account_number = $1 AND status = 'pending'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(account_number)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingRow::into_domain).transpose()
    }

    async fn transition(
        &self,
        reference: &str,
        from: PendingStatus,
        to: PendingStatus,
    ) -> Result<bool, StoreError> {
        if !from.can_transition_to(to) {
            return Ok(false);
        }
        let result = sqlx::query(
            r#"
            UPDATE pending_transactions
            SET status = $3, updated_at = NOW()
            WHERE reference = $1 AND status = $2
            "#,
        )
        .bind(reference)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, StoreError> {
        let references = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE pending_transactions
            SET status = 'expired', updated_at = NOW()
            WHERE reference IN (
                SELECT reference FROM pending_transactions
                WHERE status = 'pending' AND expires_at < $1
                ORDER BY expires_at ASC
                LIMIT $2
                FOR UPDATE SKIP LOCKED
            )
            AND status = 'pending'
            RETURNING reference
            "#,
        )
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(references)
    }

    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingTransaction>, StoreError> {
        let rows = sqlx::query_as::<_, PendingRow>(
            r#"
            SELECT * FROM pending_transactions
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(older_than)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(PendingRow::into_domain).collect()
    }
}

// ============================================================================
// Payment ledger
// ============================================================================

#[derive(Debug, Clone)]
pub struct PgPaymentLedgerRepo {
    pool: PgPool,
}

impl PgPaymentLedgerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentLedgerRepo for PgPaymentLedgerRepo {
    async fn commit_credit(
        &self,
        credit: &CreditCommand,
        policy: &AccessPolicy,
    ) -> Result<CreditOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Claim the pending transaction. Losing the CAS means another
        // delivery already settled this reference.
        let claimed = sqlx::query(
            r#"
            UPDATE pending_transactions
            SET status = 'successful', gateway_transaction_id = $2, updated_at = NOW()
            WHERE reference = $1 AND status = 'pending'
            "#,
        )
        .bind(&credit.reference)
        .bind(&credit.gateway_transaction_id)
        .execute(&mut *tx)
        .await?;
        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        // Lock the plan row for the ledger update, when there is one.
        let plan_row = match credit.enrollment_id {
            Some(enrollment_id) => {
                sqlx::query_as::<_, PlanRow>(
                    "SELECT * FROM payment_plans WHERE enrollment_id = $1 FOR UPDATE",
                )
                .bind(enrollment_id)
                .fetch_optional(&mut *tx)
                .await?
            }
            None => None,
        };
        let mut plan = plan_row.map(PlanRow::into_domain).transpose()?;

        // A credit that cannot be applied to a plan still moved money.
        let requires_review = credit.requires_review || plan.is_none();

        let record = PaymentRecord::completed(
            credit.reference.clone(),
            plan.as_ref().map(|p| p.plan_id),
            credit.amount.clone(),
            credit.currency.clone(),
            credit.gateway_transaction_id.clone(),
            requires_review,
        );
        let inserted = sqlx::query(
            r#"
            INSERT INTO payment_records (
                record_id, reference, plan_id, amount, currency, method,
                status, requires_review, gateway_transaction_id, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (reference) DO NOTHING
            "#,
        )
        .bind(record.record_id)
        .bind(&record.reference)
        .bind(record.plan_id)
        .bind(&record.amount)
        .bind(&record.currency)
        .bind(record.method.as_str())
        .bind(record.status.as_str())
        .bind(record.requires_review)
        .bind(&record.gateway_transaction_id)
        .bind(record.created_at)
        .execute(&mut *tx)
        .await?;
        if inserted.rows_affected() == 0 {
            // Uniqueness backstop tripped: a record already exists.
            tx.rollback().await?;
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        let mut decision = None;
        let mut content_unlocked_now = false;

        if let Some(plan) = plan.as_mut() {
            plan.record_payment(&credit.amount);
            sqlx::query(
                r#"
                UPDATE payment_plans
                SET total_paid = $2, status = $3, updated_at = NOW()
                WHERE plan_id = $1
                "#,
            )
            .bind(plan.plan_id)
            .bind(&plan.total_paid)
            .bind(plan.status.as_str())
            .execute(&mut *tx)
            .await?;

            // Access re-evaluation happens inside the same unit of work.
            let current_status = sqlx::query_scalar::<_, String>(
                "SELECT enrollment_status FROM enrollments WHERE enrollment_id = $1 FOR UPDATE",
            )
            .bind(plan.enrollment_id)
            .fetch_optional(&mut *tx)
            .await?;

            match current_status {
                Some(current) => {
                    // Anything other than pending_payment counts as already
                    // unlocked; statuses owned by the course subsystem are
                    // never rewritten.
                    let already_unlocked = !matches!(
                        EnrollmentStatus::from_db_status(&current),
                        Some(EnrollmentStatus::PendingPayment)
                    );
                    let evaluated =
                        policy.evaluate(&plan.total_paid, &plan.total_fee, already_unlocked);
                    content_unlocked_now = evaluated.unlock_content_access && !already_unlocked;

                    let next_status = if content_unlocked_now {
                        EnrollmentStatus::InProgress.as_str()
                    } else {
                        current.as_str()
                    };
                    let payment_status = if plan.status == PlanStatus::Completed {
                        "completed"
                    } else {
                        "pending"
                    };
                    sqlx::query(
                        r#"
                        UPDATE enrollments
                        SET payment_status = $2,
                            certificate_blocked = $3,
                            enrollment_status = $4,
                            updated_at = NOW()
                        WHERE enrollment_id = $1
                        "#,
                    )
                    .bind(plan.enrollment_id)
                    .bind(payment_status)
                    .bind(plan.is_certificate_blocked())
                    .bind(next_status)
                    .execute(&mut *tx)
                    .await?;

                    decision = Some(evaluated);
                }
                None => {
                    warn!(
                        enrollment_id = %plan.enrollment_id,
                        reference = %credit.reference,
                        "Plan exists but enrollment row is missing, flags not written"
                    );
                }
            }
        }

        tx.commit().await?;

        Ok(CreditOutcome::Applied(Box::new(AppliedCredit {
            record,
            plan,
            decision,
            content_unlocked_now,
        })))
    }

    async fn mark_record_refunded(&self, reference: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE payment_records
            SET status = 'refunded'
            WHERE reference = $1 AND status = 'completed'
            "#,
        )
        .bind(reference)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_record_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        let row = sqlx::query_as::<_, RecordRow>(
            "SELECT * FROM payment_records WHERE reference = $1",
        )
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.map(RecordRow::into_domain).transpose()
    }

    async fn find_plan_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<PaymentPlan>, StoreError> {
        let row = sqlx::query_as::<_, PlanRow>(
            "SELECT * FROM payment_plans WHERE enrollment_id = $1",
        )
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PlanRow::into_domain).transpose()
    }

    async fn is_certificate_blocked(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<bool>, StoreError> {
        let plan = self.find_plan_by_enrollment(enrollment_id).await?;
        Ok(plan.map(|p| p.is_certificate_blocked()))
    }
}
