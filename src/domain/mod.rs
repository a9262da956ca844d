//! Typed domain records for payment reconciliation and access gating.

pub mod access;
pub mod enrollment;
pub mod payment_plan;
pub mod payment_record;
pub mod pending_transaction;

pub use access::{AccessDecision, AccessPolicy};
pub use enrollment::{EnrollmentFlags, EnrollmentPaymentStatus, EnrollmentStatus};
pub use payment_plan::{PaymentPlan, PlanStatus};
pub use payment_record::{PaymentMethod, PaymentRecord, PaymentStatus};
pub use pending_transaction::{generate_reference, PendingStatus, PendingTransaction};
