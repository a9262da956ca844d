//! Outbound payment gateway integration.

pub mod client;
pub mod types;

pub use client::{GatewayClient, TransactionVerifier};
pub use types::{
    Bank, Balance, GatewayError, GatewayTxStatus, TransactionFilters, TransactionSummary,
    VerifiedTransaction, VirtualAccount,
};
