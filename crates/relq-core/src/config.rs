use std::time::Duration;

use crate::error::ConfigError;

/// Environment-driven configuration for the broker process.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listen port (`PORT`).
    pub port: u16,
    /// Backend connection string (`DATABASE_URL`, required).
    pub database_url: String,
    /// Default lease duration when a receive omits `visibility_ms`
    /// (`VISIBILITY_TIMEOUT`, seconds).
    pub visibility_timeout: Duration,
    /// Default claim batch size when a receive omits `max` (`RECEIVE_MAX`).
    pub receive_max: i64,
    /// Sweeper period (`SWEEPER_INTERVAL` or legacy `SWEEP_INTERVAL`, seconds).
    pub sweep_interval: Duration,
    /// Default log directive when `RUST_LOG` is unset (`LOG_LEVEL`).
    pub log_level: String,
    /// Initial storage connection timeout (`DB_CONNECTION_TIMEOUT`, seconds).
    pub db_connection_timeout: Duration,
}

impl Config {
    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_RECEIVE_MAX: i64 = 10;
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
    pub const DEFAULT_DB_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary lookup function. Tests inject
    /// a map here instead of mutating the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .ok()
                .filter(|p| *p > 0)
                .ok_or(ConfigError::InvalidPort(raw))?,
            None => Self::DEFAULT_PORT,
        };

        let receive_max = get_int(&lookup, "RECEIVE_MAX", Self::DEFAULT_RECEIVE_MAX);
        if receive_max <= 0 {
            return Err(ConfigError::InvalidReceiveMax(receive_max.to_string()));
        }

        // Both spellings of the sweeper interval are recognized; the longer
        // one wins when both are set.
        let sweep_interval = get_secs(&lookup, "SWEEPER_INTERVAL", Duration::ZERO);
        let sweep_interval = if sweep_interval.is_zero() {
            get_secs(&lookup, "SWEEP_INTERVAL", Self::DEFAULT_SWEEP_INTERVAL)
        } else {
            sweep_interval
        };

        Ok(Self {
            port,
            database_url,
            visibility_timeout: get_secs(
                &lookup,
                "VISIBILITY_TIMEOUT",
                Self::DEFAULT_VISIBILITY_TIMEOUT,
            ),
            receive_max,
            sweep_interval,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            db_connection_timeout: get_secs(
                &lookup,
                "DB_CONNECTION_TIMEOUT",
                Self::DEFAULT_DB_CONNECTION_TIMEOUT,
            ),
        })
    }
}

fn get_int<F>(lookup: &F, name: &str, default: i64) -> i64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read an env var holding whole seconds; unset or unparsable values fall
/// back to the default.
fn get_secs<F>(lookup: &F, name: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}
