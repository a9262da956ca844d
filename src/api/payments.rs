//! Payment endpoints.
//!
//! `initialize` issues a virtual account and the pending transaction for
//! it; `status` is the student-facing view; `check` is the on-demand
//! poll-reconcile used by support tooling; `certificate-eligibility` is
//! the gate the certificate service calls right before rendering output.

use axum::extract::{Path, State};
use axum::Json;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::domain::{generate_reference, PendingStatus, PendingTransaction};
use crate::error::AppError;
use crate::logging::mask_account_number;
use crate::reconcile::{CheckResult, ReconcileOutcome};

use super::{ApiError, AppState};

// ============================================================================
// Initialize
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct InitializePaymentRequest {
    pub user_id: Uuid,
    pub enrollment_id: Uuid,
    #[serde(default)]
    pub course_id: Option<Uuid>,
    /// Amount to request; defaults to the outstanding plan balance.
    #[serde(default)]
    pub amount: Option<BigDecimal>,
    /// Name to put on the virtual account.
    pub account_name: String,
}

#[derive(Debug, Serialize)]
pub struct InitializePaymentResponse {
    pub reference: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub account_number: String,
    pub bank_name: String,
    pub account_name: String,
    pub expires_at: DateTime<Utc>,
}

pub async fn initialize_payment(
    State(state): State<AppState>,
    Json(request): Json<InitializePaymentRequest>,
) -> Result<Json<InitializePaymentResponse>, ApiError> {
    if request.account_name.trim().is_empty() {
        return Err(AppError::Validation("account_name must not be empty".to_string()).into());
    }

    let plan = state
        .ledger
        .find_plan_by_enrollment(request.enrollment_id)
        .await?
        .ok_or(AppError::PlanNotFound(request.enrollment_id))?;

    let outstanding = plan.balance();
    if outstanding <= BigDecimal::zero() {
        return Err(
            AppError::Validation("payment plan is already fully settled".to_string()).into(),
        );
    }

    let amount = request.amount.unwrap_or_else(|| outstanding.clone());
    if amount <= BigDecimal::zero() {
        return Err(AppError::Validation("amount must be positive".to_string()).into());
    }
    if amount > outstanding {
        return Err(AppError::Validation(format!(
            "amount exceeds outstanding balance of {}",
            plan.formatted_balance()
        ))
        .into());
    }

    let reference = generate_reference();
    let metadata = json!({
        "user_id": request.user_id,
        "enrollment_id": request.enrollment_id,
        "course_id": request.course_id,
    });
    let account = state
        .gateway
        .create_virtual_account(&reference, request.account_name.trim(), Some(metadata))
        .await
        .map_err(AppError::Gateway)?;

    let expires_at = Utc::now() + chrono::Duration::hours(state.config.pending_ttl_hours);
    let pending = PendingTransaction::new(
        reference.clone(),
        request.user_id,
        Some(request.enrollment_id),
        request.course_id,
        amount.clone(),
        plan.currency.clone(),
        account.account_number.clone(),
        account.bank_name.clone(),
        account.account_name.clone(),
        account.account_id.clone(),
        expires_at,
    );
    state.pending.insert(&pending).await?;

    info!(
        reference = %reference,
        enrollment_id = %request.enrollment_id,
        amount = %amount,
        account_number = %mask_account_number(&account.account_number),
        "Payment initialized"
    );

    Ok(Json(InitializePaymentResponse {
        reference,
        amount,
        currency: plan.currency,
        account_number: account.account_number,
        bank_name: account.bank_name,
        account_name: account.account_name,
        expires_at,
    }))
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub reference: String,
    pub status: PendingStatus,
    pub amount: BigDecimal,
    pub currency: String,
    pub account_number: String,
    pub bank_name: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_review: Option<bool>,
}

fn status_message(tx: &PendingTransaction) -> String {
    match tx.status {
        // The sweep may not have caught an overdue request yet.
        PendingStatus::Pending if tx.is_expired(Utc::now()) => {
            "This payment request has passed its expiry. Initialize a new payment to continue."
                .to_string()
        }
        PendingStatus::Pending => format!(
            "Transfer {} {} to {} account {} to complete this payment.",
            tx.amount, tx.currency, tx.bank_name, tx.account_number
        ),
        PendingStatus::Successful => {
            "Payment received. Your course access reflects the new balance.".to_string()
        }
        PendingStatus::Failed => {
            "The gateway reported this payment as failed. Nothing was credited.".to_string()
        }
        PendingStatus::Reversed => {
            "This payment was reversed by the gateway and is under review.".to_string()
        }
        PendingStatus::Expired => {
            "This payment request expired. Initialize a new payment to continue.".to_string()
        }
    }
}

pub async fn payment_status(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let tx = state
        .pending
        .find_by_reference(&reference)
        .await?
        .ok_or_else(|| AppError::UnknownReference(reference.clone()))?;

    let requires_review = state
        .ledger
        .find_record_by_reference(&reference)
        .await?
        .map(|record| record.requires_review);

    let message = status_message(&tx);
    Ok(Json(PaymentStatusResponse {
        reference: tx.reference,
        status: tx.status,
        amount: tx.amount,
        currency: tx.currency,
        account_number: tx.account_number,
        bank_name: tx.bank_name,
        expires_at: tx.expires_at,
        message,
        requires_review,
    }))
}

// ============================================================================
// On-demand check
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CheckPaymentResponse {
    pub reference: String,
    pub result: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

pub async fn check_payment(
    State(state): State<AppState>,
    Path(reference): Path<String>,
) -> Result<Json<CheckPaymentResponse>, ApiError> {
    let checked = state.poller.check_payment_status(&reference).await?;

    let (result, detail) = match checked {
        CheckResult::NotFound => {
            return Err(AppError::UnknownReference(reference).into());
        }
        CheckResult::AlreadyFinal(status) => ("already_final", Some(status.as_str().to_string())),
        CheckResult::GatewayPending => ("gateway_pending", None),
        CheckResult::Reconciled(outcome) => match outcome {
            ReconcileOutcome::Credited {
                requires_review, ..
            } => (
                "credited",
                requires_review.then(|| "flagged for review".to_string()),
            ),
            ReconcileOutcome::AlreadyProcessed { .. } => ("already_processed", None),
            ReconcileOutcome::MarkedFailed { .. } => ("marked_failed", None),
            ReconcileOutcome::Reversed { .. } => ("reversed", None),
            ReconcileOutcome::NoMatch => ("no_match", None),
            ReconcileOutcome::Ignored => ("ignored", None),
        },
    };

    Ok(Json(CheckPaymentResponse {
        reference,
        result,
        detail,
    }))
}

// ============================================================================
// Certificate gate
// ============================================================================

#[derive(Debug, Serialize)]
pub struct CertificateEligibilityResponse {
    pub enrollment_id: Uuid,
    pub certificate_blocked: bool,
    pub eligible: bool,
    pub progress_percent: BigDecimal,
    pub outstanding_balance: String,
}

/// Computed from the live plan balance at call time. Certificate
/// generation must hit this immediately before producing output.
pub async fn certificate_eligibility(
    State(state): State<AppState>,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<CertificateEligibilityResponse>, ApiError> {
    let blocked = state
        .ledger
        .is_certificate_blocked(enrollment_id)
        .await?
        .ok_or(AppError::PlanNotFound(enrollment_id))?;
    let plan = state
        .ledger
        .find_plan_by_enrollment(enrollment_id)
        .await?
        .ok_or(AppError::PlanNotFound(enrollment_id))?;

    Ok(Json(CertificateEligibilityResponse {
        enrollment_id,
        certificate_blocked: blocked,
        eligible: !blocked,
        progress_percent: plan.progress_percent(),
        outstanding_balance: plan.formatted_balance(),
    }))
}
