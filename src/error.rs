//! Application-level error taxonomy.
//!
//! Duplicate deliveries and already-processed transitions are not errors;
//! the engine reports them as outcomes. Errors here are the cases a
//! caller has to act on.

use uuid::Uuid;

use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::webhook::SignatureError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Ledger or lookup failure. Nothing was credited; safe to retry.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// Rejected webhook. Logged as a security event, never processed.
    #[error("webhook signature rejected: {0}")]
    SignatureInvalid(#[from] SignatureError),

    #[error("unknown payment reference {0}")]
    UnknownReference(String),

    #[error("payment plan not found for enrollment {0}")]
    PlanNotFound(Uuid),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl AppError {
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Store(StoreError::Database(_)) => true,
            AppError::Gateway(e) => e.is_retryable(),
            _ => false,
        }
    }
}
