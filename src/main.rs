use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;

use learngate_backend::api::{router, AppState};
use learngate_backend::audit::{AuditLog, PgAuditLog};
use learngate_backend::config::AppConfig;
use learngate_backend::gateway::GatewayClient;
use learngate_backend::logging::init_tracing;
use learngate_backend::notify::{self, LoggingNotifier};
use learngate_backend::reconcile::{PollReconciler, ReconciliationEngine};
use learngate_backend::store::postgres::{PgPaymentLedgerRepo, PgPendingTransactionRepo};
use learngate_backend::store::{PaymentLedgerRepo, PendingTransactionRepo};
use learngate_backend::webhook::WebhookVerifier;
use learngate_backend::workers::sweeper::ExpirationSweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = Arc::new(AppConfig::from_env().context("loading configuration")?);
    info!("Starting learngate backend service");

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await
        .context("connecting to Postgres")?;

    let audit: Arc<dyn AuditLog> = Arc::new(PgAuditLog::new(pool.clone()));
    let pending: Arc<dyn PendingTransactionRepo> =
        Arc::new(PgPendingTransactionRepo::new(pool.clone()));
    let ledger: Arc<dyn PaymentLedgerRepo> = Arc::new(PgPaymentLedgerRepo::new(pool.clone()));

    let gateway = Arc::new(
        GatewayClient::new(config.gateway.clone(), audit.clone())
            .context("building gateway client")?,
    );

    let (notifications, dispatcher) = notify::channel(
        config.notification_queue_size,
        Arc::new(LoggingNotifier),
    );

    let engine = Arc::new(ReconciliationEngine::new(
        pending.clone(),
        ledger.clone(),
        audit.clone(),
        notifications,
        config.access,
        config.reconcile,
    ));
    let poller = Arc::new(PollReconciler::new(
        pending.clone(),
        gateway.clone(),
        engine.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = ExpirationSweeper::new(
        pending.clone(),
        poller.clone(),
        audit.clone(),
        config.sweeper.clone(),
    );
    let sweeper_shutdown = shutdown_rx.clone();
    tokio::spawn(async move { sweeper.run(sweeper_shutdown).await });
    tokio::spawn(dispatcher.run(shutdown_rx));

    let state = AppState {
        pending,
        ledger,
        engine,
        poller,
        gateway,
        verifier: Arc::new(WebhookVerifier::new(config.webhook.secret.clone())),
        audit,
        config: config.clone(),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context("binding listener")?;
    info!(addr = %config.bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Ctrl-C received, shutting down");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    info!("Learngate backend stopped");
    Ok(())
}
