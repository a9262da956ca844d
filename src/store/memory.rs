//! In-process store used by the integration tests.
//!
//! Mirrors the Postgres semantics: guarded status swaps, one record per
//! reference, plan update and enrollment write-through under a single
//! lock so concurrent deliveries observe the same atomicity.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    AccessPolicy, EnrollmentFlags, EnrollmentPaymentStatus, EnrollmentStatus, PaymentPlan,
    PaymentRecord, PaymentStatus, PendingStatus, PendingTransaction, PlanStatus,
};

use super::{
    AppliedCredit, CreditCommand, CreditOutcome, PaymentLedgerRepo, PendingTransactionRepo,
    StoreError,
};

#[derive(Default)]
struct Inner {
    pending: HashMap<String, PendingTransaction>,
    records: HashMap<String, PaymentRecord>,
    plans: HashMap<Uuid, PaymentPlan>,
    enrollments: HashMap<Uuid, EnrollmentFlags>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("store mutex poisoned")
    }

    pub fn seed_plan(&self, plan: PaymentPlan) {
        let mut inner = self.lock();
        inner
            .enrollments
            .insert(plan.enrollment_id, EnrollmentFlags::initial(plan.enrollment_id));
        inner.plans.insert(plan.enrollment_id, plan);
    }

    pub fn pending_snapshot(&self, reference: &str) -> Option<PendingTransaction> {
        self.lock().pending.get(reference).cloned()
    }

    pub fn record_snapshot(&self, reference: &str) -> Option<PaymentRecord> {
        self.lock().records.get(reference).cloned()
    }

    pub fn plan_snapshot(&self, enrollment_id: Uuid) -> Option<PaymentPlan> {
        self.lock().plans.get(&enrollment_id).cloned()
    }

    pub fn enrollment_snapshot(&self, enrollment_id: Uuid) -> Option<EnrollmentFlags> {
        self.lock().enrollments.get(&enrollment_id).cloned()
    }

    pub fn record_count(&self) -> usize {
        self.lock().records.len()
    }
}

#[async_trait]
impl PendingTransactionRepo for InMemoryStore {
    async fn insert(&self, tx: &PendingTransaction) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.pending.contains_key(&tx.reference) {
            return Err(StoreError::Conflict(format!(
                "pending transaction {} already exists",
                tx.reference
            )));
        }
        inner.pending.insert(tx.reference.clone(), tx.clone());
        Ok(())
    }

    async fn find_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        Ok(self.lock().pending.get(reference).cloned())
    }

    async fn find_pending_by_account(
        &self,
        account_number: &str,
    ) -> Result<Option<PendingTransaction>, StoreError> {
        let inner = self.lock();
        let mut candidates: Vec<&PendingTransaction> = inner
            .pending
            .values()
            .filter(|tx| tx.account_number == account_number && tx.status == PendingStatus::Pending)
            .collect();
        candidates.sort_by_key(|tx| tx.created_at);
        Ok(candidates.last().map(|tx| (*tx).clone()))
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
        let mut inner = self.lock();
        match inner.pending.get_mut(reference) {
            Some(tx) if tx.status == from => {
                tx.status = to;
                tx.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn expire_due(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, StoreError> {
        let mut inner = self.lock();
        let mut due: Vec<String> = inner
            .pending
            .values()
            .filter(|tx| tx.status == PendingStatus::Pending && tx.expires_at < now)
            .map(|tx| tx.reference.clone())
            .collect();
        due.sort();
        due.truncate(limit as usize);
        for reference in &due {
            if let Some(tx) = inner.pending.get_mut(reference) {
                tx.status = PendingStatus::Expired;
                tx.updated_at = now;
            }
        }
        Ok(due)
    }

    async fn stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<PendingTransaction>, StoreError> {
        let inner = self.lock();
        let mut stale: Vec<PendingTransaction> = inner
            .pending
            .values()
            .filter(|tx| tx.status == PendingStatus::Pending && tx.created_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|tx| tx.created_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }
}

#[async_trait]
impl PaymentLedgerRepo for InMemoryStore {
    async fn commit_credit(
        &self,
        credit: &CreditCommand,
        policy: &AccessPolicy,
    ) -> Result<CreditOutcome, StoreError> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        // Guarded claim of the pending transaction.
        match inner.pending.get_mut(&credit.reference) {
            Some(tx) if tx.status == PendingStatus::Pending => {
                tx.status = PendingStatus::Successful;
                tx.updated_at = Utc::now();
            }
            Some(_) => return Ok(CreditOutcome::AlreadyProcessed),
            None => return Ok(CreditOutcome::AlreadyProcessed),
        }

        if inner.records.contains_key(&credit.reference) {
            // Backstop: a record already exists for this reference. Undo
            // the claim so the stored state stays consistent.
            if let Some(tx) = inner.pending.get_mut(&credit.reference) {
                tx.status = PendingStatus::Pending;
            }
            return Ok(CreditOutcome::AlreadyProcessed);
        }

        let plan_key = credit
            .enrollment_id
            .filter(|id| inner.plans.contains_key(id));
        let requires_review = credit.requires_review || plan_key.is_none();

        let record = PaymentRecord::completed(
            credit.reference.clone(),
            plan_key.and_then(|id| inner.plans.get(&id).map(|p| p.plan_id)),
            credit.amount.clone(),
            credit.currency.clone(),
            credit.gateway_transaction_id.clone(),
            requires_review,
        );
        inner.records.insert(credit.reference.clone(), record.clone());

        let mut plan_after = None;
        let mut decision = None;
        let mut content_unlocked_now = false;

        if let Some(enrollment_id) = plan_key {
            let already_unlocked = inner
                .enrollments
                .get(&enrollment_id)
                .map(|e| e.status == EnrollmentStatus::InProgress)
                .unwrap_or(false);

            if let Some(plan) = inner.plans.get_mut(&enrollment_id) {
                plan.record_payment(&credit.amount);
                let evaluated =
                    policy.evaluate(&plan.total_paid, &plan.total_fee, already_unlocked);
                content_unlocked_now = evaluated.unlock_content_access && !already_unlocked;
                let blocked = plan.is_certificate_blocked();
                let payment_status = if plan.status == PlanStatus::Completed {
                    EnrollmentPaymentStatus::Completed
                } else {
                    EnrollmentPaymentStatus::Pending
                };
                plan_after = Some(plan.clone());

                if let Some(flags) = inner.enrollments.get_mut(&enrollment_id) {
                    flags.payment_status = payment_status;
                    flags.certificate_blocked = blocked;
                    if content_unlocked_now {
                        flags.status = EnrollmentStatus::InProgress;
                    }
                }
                decision = Some(evaluated);
            }
        }

        Ok(CreditOutcome::Applied(Box::new(AppliedCredit {
            record,
            plan: plan_after,
            decision,
            content_unlocked_now,
        })))
    }

    async fn mark_record_refunded(&self, reference: &str) -> Result<bool, StoreError> {
        let mut inner = self.lock();
        match inner.records.get_mut(reference) {
            Some(record) if record.status.can_transition_to(PaymentStatus::Refunded) => {
                record.status = PaymentStatus::Refunded;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_record_by_reference(
        &self,
        reference: &str,
    ) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.lock().records.get(reference).cloned())
    }

    async fn find_plan_by_enrollment(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<PaymentPlan>, StoreError> {
        Ok(self.lock().plans.get(&enrollment_id).cloned())
    }

    async fn is_certificate_blocked(
        &self,
        enrollment_id: Uuid,
    ) -> Result<Option<bool>, StoreError> {
        Ok(self
            .lock()
            .plans
            .get(&enrollment_id)
            .map(|p| p.is_certificate_blocked()))
    }
}
