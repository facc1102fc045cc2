//! Service configuration, read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Configuration for the HTTP service and its collaborators.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP server binds on `0.0.0.0`.
    pub port: u16,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Bearer token guarding `/api/admin`. `None` disables the guard.
    pub admin_token: Option<SecretString>,
    /// Per-request timeout for outbound webhook deliveries.
    pub webhook_timeout: Duration,
    /// Funnel sessions idle longer than this are pruned.
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/solar-quote.db"),
            admin_token: None,
            webhook_timeout: Duration::from_secs(10),
            session_idle_timeout: Duration::from_secs(60 * 60), // 1 hour
        }
    }
}

impl ServerConfig {
    /// Build configuration from `SOLAR_QUOTE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    ///
    /// Unset keys fall back to [`ServerConfig::default`]; set but unparsable
    /// keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port = parse_or(&lookup, "SOLAR_QUOTE_PORT", defaults.port)?;

        let db_path = lookup("SOLAR_QUOTE_DB_PATH")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let admin_token = lookup("SOLAR_QUOTE_ADMIN_TOKEN")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let webhook_timeout_secs: u64 = parse_or(
            &lookup,
            "SOLAR_QUOTE_WEBHOOK_TIMEOUT_SECS",
            defaults.webhook_timeout.as_secs(),
        )?;
        if webhook_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SOLAR_QUOTE_WEBHOOK_TIMEOUT_SECS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let idle_minutes: u64 = parse_or(
            &lookup,
            "SOLAR_QUOTE_SESSION_IDLE_MINUTES",
            defaults.session_idle_timeout.as_secs() / 60,
        )?;

        Ok(Self {
            port,
            db_path,
            admin_token,
            webhook_timeout: Duration::from_secs(webhook_timeout_secs),
            session_idle_timeout: Duration::from_secs(idle_minutes * 60),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })
        }
        _ => Ok(default),
    }
}
