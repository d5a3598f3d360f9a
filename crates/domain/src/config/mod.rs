mod dispatch;
mod observability;
mod server;
mod telegram;

pub use dispatch::*;
pub use observability::*;
pub use server::*;
pub use telegram::*;

use serde::{Deserialize, Serialize};
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl ConfigError {
    fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Error,
            field: field.into(),
            message: message.into(),
        }
    }

    fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            severity: ConfigSeverity::Warning,
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError::error(
                "server.port",
                "port must be greater than 0",
            ));
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError::error("server.host", "host must not be empty"));
        }

        if let Err(e) = parse_http_url(&self.telegram.api_base_url) {
            errors.push(ConfigError::error("telegram.api_base_url", e));
        }

        match self.telegram.webhook_url.as_deref().map(parse_http_url) {
            None => errors.push(ConfigError::warning(
                "telegram.webhook_url",
                "no webhook_url configured; the provider must be pointed at this \
                 server by other means",
            )),
            Some(Err(e)) => errors.push(ConfigError::error(
                "telegram.webhook_url",
                format!("webhook_url must be an absolute http(s) URL: {e}"),
            )),
            Some(Ok(url)) if url.scheme() == "http" => errors.push(ConfigError::warning(
                "telegram.webhook_url",
                "the Bot API only delivers to https:// webhooks",
            )),
            Some(Ok(_)) => {}
        }

        if self.telegram.request_timeout_secs == 0 {
            errors.push(ConfigError::error(
                "telegram.request_timeout_secs",
                "request timeout must be greater than 0",
            ));
        }

        if self.dispatch.tick_interval_ms == 0 {
            errors.push(ConfigError::error(
                "dispatch.tick_interval_ms",
                "tick interval must be greater than 0",
            ));
        }

        if self.dispatch.max_in_flight == 0 || self.dispatch.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            errors.push(ConfigError::warning(
                "dispatch.max_in_flight",
                format!("clamped to 1..={MAX_IN_FLIGHT_LIMIT}"),
            ));
        }

        let eviction = &self.dispatch.eviction;
        match eviction.policy {
            EvictionMode::IdleTimeout if eviction.idle_secs == 0 => {
                errors.push(ConfigError::error(
                    "dispatch.eviction.idle_secs",
                    "idle_secs must be greater than 0 for idle_timeout",
                ));
            }
            EvictionMode::LruCapacity if eviction.capacity == 0 => {
                errors.push(ConfigError::error(
                    "dispatch.eviction.capacity",
                    "capacity must be greater than 0 for lru_capacity",
                ));
            }
            EvictionMode::RetainAll => errors.push(ConfigError::warning(
                "dispatch.eviction.policy",
                "retain_all keeps every session queue for the process lifetime",
            )),
            _ => {}
        }
        if eviction.policy != EvictionMode::RetainAll && eviction.sweep_interval_secs == 0 {
            errors.push(ConfigError::error(
                "dispatch.eviction.sweep_interval_secs",
                "sweep interval must be greater than 0",
            ));
        }

        if !(0.0..=1.0).contains(&self.observability.sample_rate) {
            errors.push(ConfigError::error(
                "observability.sample_rate",
                "sample_rate must be within 0.0..=1.0",
            ));
        }

        errors
    }
}
