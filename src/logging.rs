//! Logging and tracing configuration.
//!
//! Structured JSON output in production, human-readable output in
//! development, with environment-based log level configuration and
//! helpers for keeping account numbers and secrets out of the logs.

use std::env;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment types for logging configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    /// Detect environment from ENV variable.
    pub fn from_env() -> Self {
        match env::var("ENVIRONMENT")
            .or_else(|_| env::var("ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "prod" | "production" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn default_log_level(&self) -> Level {
        match self {
            Self::Development => Level::DEBUG,
            Self::Staging => Level::INFO,
            Self::Production => Level::INFO,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// Initialize the tracing subscriber with appropriate formatting.
///
/// # Environment Variables
/// - `ENVIRONMENT` or `ENV`: "production", "staging", or "development"
/// - `RUST_LOG`: override the filter entirely
/// - `LOG_FORMAT`: force "json" or "pretty"
pub fn init_tracing() {
    let environment = Environment::from_env();

    let use_json = env::var("LOG_FORMAT")
        .map(|f| f.to_lowercase() == "json")
        .unwrap_or_else(|_| environment.is_production());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "{}={},tower_http=debug,axum=debug,sqlx=warn,hyper=warn,reqwest=warn",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                environment.default_log_level()
            ))
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        let json_layer = fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true)
            .with_level(true)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(json_layer).init();
    } else {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_target(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_filter(env_filter);

        tracing_subscriber::registry().with(pretty_layer).init();
    }

    tracing::info!(
        environment = ?environment,
        format = if use_json { "json" } else { "pretty" },
        "Tracing initialized"
    );
}

/// Mask a bank account number for logging: keep the last 4 digits.
pub fn mask_account_number(account_number: &str) -> String {
    if account_number.len() <= 4 {
        return "****".to_string();
    }
    format!(
        "******{}",
        &account_number[account_number.len() - 4..]
    )
}

/// Redact sensitive fields from JSON-like text before it hits a log line
/// or the audit trail.
pub fn redact_sensitive_data(text: &str) -> String {
    let sensitive_keys = [
        "secret",
        "secret_key",
        "password",
        "token",
        "api_key",
        "apiKey",
        "authorization",
        "sender_phone",
    ];

    let mut result = text.to_string();
    for key in &sensitive_keys {
        let patterns = [
            format!(r#""{}":\s*"[^"]*""#, key),
            format!(r#"'{}': '[^']*'"#, key),
        ];

        for pattern in &patterns {
            if let Ok(re) = regex::Regex::new(pattern) {
                result = re
                    .replace_all(&result, format!(r#""{}": "[REDACTED]""#, key))
                    .to_string();
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        env::set_var("ENVIRONMENT", "production");
        assert_eq!(Environment::from_env(), Environment::Production);
        assert!(Environment::from_env().is_production());

        env::set_var("ENVIRONMENT", "development");
        assert_eq!(Environment::from_env(), Environment::Development);
        assert!(!Environment::from_env().is_production());
    }

    #[test]
    fn test_mask_account_number() {
        assert_eq!(mask_account_number("9901234567"), "******4567");
        assert_eq!(mask_account_number("123"), "****");
    }

    #[test]
    fn test_default_log_levels() {
        assert_eq!(Environment::Development.default_log_level(), Level::DEBUG);
        assert_eq!(Environment::Production.default_log_level(), Level::INFO);
        assert_eq!(Environment::Staging.default_log_level(), Level::INFO);
    }

    #[test]
    fn test_redact_sensitive_data() {
        let data = r#"{"secret_key": "sk_live_123", "amount": 100}"#;
        let redacted = redact_sensitive_data(data);
        assert!(redacted.contains("[REDACTED]"));
        assert!(!redacted.contains("sk_live_123"));
        assert!(redacted.contains("100"));
    }

    #[test]
    fn test_redact_sender_phone() {
        let data = r#"{"sender_phone": "+2348012345678", "narration": "fees"}"#;
        let redacted = redact_sensitive_data(data);
        assert!(!redacted.contains("+2348012345678"));
        assert!(redacted.contains("fees"));
    }
}
