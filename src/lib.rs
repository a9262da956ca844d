//! Payment reconciliation and course-access gating backend.
//!
//! Accepts at-least-once webhook notifications from a bank-transfer
//! payment gateway, matches them against locally-issued virtual-account
//! payment requests, applies each credit to a per-enrollment payment
//! plan exactly once, and gates course access and certificate issuance
//! on the resulting balance.

pub mod api;
pub mod audit;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod middleware;
pub mod notify;
pub mod reconcile;
pub mod store;
pub mod webhook;
pub mod workers;

pub use error::AppError;
