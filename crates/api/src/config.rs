//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::{DownpaymentTerms, OrderError};

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `8080`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL URL; in-memory storage when unset
/// - `REDIS_URL`: Redis URL; in-memory cache when unset
/// - `KAFKA_BROKERS`: bootstrap servers; events are only logged when unset
/// - `DOWNPAYMENT_PERCENT`: share of the total reserved (default: `0.15`)
/// - `RESERVATION_HOURS`: reservation hold (default: `48`)
/// - `CACHE_TTL_SECS`: cached order lifetime (default: `300`)
/// - `SWEEP_INTERVAL_SECS`: time between expiration sweeps (default: `300`)
/// - `SHUTDOWN_GRACE_SECS`: time allowed for in-flight work at shutdown (default: `30`)
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub kafka_brokers: Option<String>,
    pub downpayment_percent: f64,
    pub reservation_hours: i64,
    pub cache_ttl: Duration,
    pub sweep_interval: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let secs = |key: &str| parse_var::<u64>(&lookup, key).map(Duration::from_secs);

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse_var(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: non_empty("DATABASE_URL"),
            redis_url: non_empty("REDIS_URL"),
            kafka_brokers: non_empty("KAFKA_BROKERS"),
            downpayment_percent: parse_var(&lookup, "DOWNPAYMENT_PERCENT")
                .unwrap_or(defaults.downpayment_percent),
            reservation_hours: parse_var(&lookup, "RESERVATION_HOURS")
                .unwrap_or(defaults.reservation_hours),
            cache_ttl: secs("CACHE_TTL_SECS").unwrap_or(defaults.cache_ttl),
            sweep_interval: secs("SWEEP_INTERVAL_SECS")
                .filter(|interval| !interval.is_zero())
                .unwrap_or(defaults.sweep_interval),
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS").unwrap_or(defaults.shutdown_grace),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the reservation terms, rejecting out-of-range values.
    pub fn downpayment_terms(&self) -> Result<DownpaymentTerms, OrderError> {
        let hold = chrono::Duration::try_hours(self.reservation_hours).ok_or_else(|| {
            OrderError::InvalidTerms(format!(
                "reservation hours out of range: {}",
                self.reservation_hours
            ))
        })?;
        DownpaymentTerms::new(self.downpayment_percent, hold)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            log_level: "info".to_string(),
            database_url: None,
            redis_url: None,
            kafka_brokers: None,
            downpayment_percent: 0.15,
            reservation_hours: 48,
            cache_ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(300),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}
