//! Expiration sweeper and poll-reconciler worker.
//!
//! Runs on its own schedule and competes with live webhook traffic for
//! the same rows, so every mutation goes through the same guarded
//! transitions the engine uses. Two stages per cycle:
//!
//! - expire `pending` transactions whose expiry has passed
//! - re-query the gateway for pending transactions old enough that a
//!   webhook has probably been missed, and feed confirmations through
//!   the regular reconciliation path

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, instrument, warn};

use crate::audit::{AuditEntry, AuditLog};
use crate::reconcile::{CheckResult, PollReconciler};
use crate::store::PendingTransactionRepo;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often a sweep cycle runs (seconds).
    pub interval_secs: u64,
    /// Max rows expired per cycle.
    pub expire_batch: i64,
    /// Max pending transactions re-queried per cycle.
    pub poll_batch: i64,
    /// Only poll transactions at least this old (seconds); younger ones
    /// get their webhook a chance to arrive first.
    pub poll_min_age_secs: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            expire_batch: 100,
            poll_batch: 25,
            poll_min_age_secs: 120,
        }
    }
}

impl SweeperConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.interval_secs = std::env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.interval_secs);
        cfg.expire_batch = std::env::var("SWEEP_EXPIRE_BATCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.expire_batch);
        cfg.poll_batch = std::env::var("SWEEP_POLL_BATCH")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.poll_batch);
        cfg.poll_min_age_secs = std::env::var("SWEEP_POLL_MIN_AGE_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cfg.poll_min_age_secs);
        cfg
    }
}

// ============================================================================
// Worker
// ============================================================================

pub struct ExpirationSweeper {
    pending: Arc<dyn PendingTransactionRepo>,
    poller: Arc<PollReconciler>,
    audit: Arc<dyn AuditLog>,
    config: SweeperConfig,
}

impl ExpirationSweeper {
    pub fn new(
        pending: Arc<dyn PendingTransactionRepo>,
        poller: Arc<PollReconciler>,
        audit: Arc<dyn AuditLog>,
        config: SweeperConfig,
    ) -> Self {
        Self {
            pending,
            poller,
            audit,
            config,
        }
    }

    /// Main worker loop, runs until shutdown.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval_secs,
            "Expiration sweeper started"
        );

        let mut ticker = interval(Duration::from_secs(self.config.interval_secs));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("Shutdown signal received, stopping sweeper");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.cycle().await {
                        error!(error = %e, "Error in sweeper cycle");
                    }
                }
            }
        }

        info!("Expiration sweeper stopped");
    }

    /// One sweep cycle.
    pub async fn cycle(&self) -> Result<(), crate::store::StoreError> {
        self.expire_stale().await?;
        self.poll_unresolved().await;
        Ok(())
    }

    #[instrument(skip(self), fields(worker = "sweeper"))]
    async fn expire_stale(&self) -> Result<(), crate::store::StoreError> {
        let expired = self
            .pending
            .expire_due(Utc::now(), self.config.expire_batch)
            .await?;

        for reference in &expired {
            info!(reference = %reference, "Pending transaction expired");
            self.audit
                .append(AuditEntry::transition(reference, "pending -> expired"))
                .await;
        }
        if expired.len() as i64 == self.config.expire_batch {
            debug!(batch = self.config.expire_batch, "Expiry batch full, more due next cycle");
        }

        Ok(())
    }

    /// Polling fallback for missed webhooks. Gateway failures here are
    /// logged and skipped; the next cycle tries again.
    #[instrument(skip(self), fields(worker = "sweeper"))]
    async fn poll_unresolved(&self) {
        let older_than = Utc::now() - chrono::Duration::seconds(self.config.poll_min_age_secs);
        let stale = match self
            .pending
            .stale_pending(older_than, self.config.poll_batch)
            .await
        {
            Ok(stale) => stale,
            Err(e) => {
                error!(error = %e, "Failed to list stale pending transactions");
                return;
            }
        };

        for tx in stale {
            debug!(reference = %tx.reference, "Re-querying gateway for stale pending transaction");
            match self.poller.check_payment_status(&tx.reference).await {
                Ok(CheckResult::Reconciled(outcome)) => {
                    info!(reference = %tx.reference, ?outcome, "Poll reconciled a missed event");
                }
                Ok(CheckResult::GatewayPending) => {
                    debug!(reference = %tx.reference, "Gateway still pending");
                }
                Ok(other) => {
                    debug!(reference = %tx.reference, ?other, "Poll check finished");
                }
                Err(e) => {
                    warn!(reference = %tx.reference, error = %e, "Poll check failed");
                }
            }
        }
    }
}
