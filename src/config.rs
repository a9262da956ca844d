//! Environment-driven configuration.
//!
//! Required values fail fast at startup; everything else has a sensible
//! default that an env var can override.

use crate::domain::AccessPolicy;
use crate::reconcile::ReconcileConfig;
use crate::workers::sweeper::SweeperConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Outbound gateway connection settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    /// Bearer token for every call.
    pub secret_key: String,
    pub timeout_secs: u64,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: required("GATEWAY_BASE_URL")?,
            secret_key: required("GATEWAY_SECRET_KEY")?,
            timeout_secs: parsed_or("GATEWAY_TIMEOUT_SECS", 60),
        })
    }
}

/// Inbound webhook settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret for the HMAC over the raw body.
    pub secret: String,
    /// Header the gateway delivers the signature in.
    pub signature_header: String,
}

impl WebhookConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: required("WEBHOOK_SECRET")?,
            signature_header: std::env::var("WEBHOOK_SIGNATURE_HEADER")
                .unwrap_or_else(|_| "x-webhook-signature".to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_url: String,
    pub gateway: GatewayConfig,
    pub webhook: WebhookConfig,
    pub access: AccessPolicy,
    pub reconcile: ReconcileConfig,
    pub sweeper: SweeperConfig,
    /// How long an issued virtual account stays payable.
    pub pending_ttl_hours: i64,
    pub notification_queue_size: usize,
    pub db_max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let access = AccessPolicy {
            content_unlock_percent: parsed_or(
                "CONTENT_UNLOCK_PERCENT",
                AccessPolicy::default().content_unlock_percent,
            ),
            certificate_release_percent: parsed_or(
                "CERTIFICATE_RELEASE_PERCENT",
                AccessPolicy::default().certificate_release_percent,
            ),
        };

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string()),
            database_url: required("DATABASE_URL")?,
            gateway: GatewayConfig::from_env()?,
            webhook: WebhookConfig::from_env()?,
            access,
            reconcile: ReconcileConfig::from_env(),
            sweeper: SweeperConfig::from_env(),
            pending_ttl_hours: parsed_or("PENDING_TTL_HOURS", 24),
            notification_queue_size: parsed_or("NOTIFICATION_QUEUE_SIZE", 1024),
            db_max_connections: parsed_or("DB_MAX_CONNECTIONS", 10),
        })
    }
}
