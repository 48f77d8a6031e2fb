//! Application configuration loaded from environment variables.

use std::time::Duration;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: Postgres connection string; the in-memory store is
///   used when unset
/// - `RECONCILE_INTERVAL_SECS`: seconds between reconciliation passes
///   (default: `60`)
/// - `RECONCILE_MIN_AGE_SECS`: orders younger than this are left to the
///   checkout that created them (default: `120`)
/// - `SETTLEMENT_MAX_ATTEMPTS`: settlement attempts per order inside one
///   pass (default: `5`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub reconcile_interval: Duration,
    pub reconcile_min_age: Duration,
    pub settlement_max_attempts: u32,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            reconcile_interval: lookup("RECONCILE_INTERVAL_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|&secs| secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_interval),
            reconcile_min_age: lookup("RECONCILE_MIN_AGE_SECS")
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.reconcile_min_age),
            settlement_max_attempts: lookup("SETTLEMENT_MAX_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.settlement_max_attempts),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            reconcile_interval: Duration::from_secs(60),
            reconcile_min_age: Duration::from_secs(120),
            settlement_max_attempts: 5,
        }
    }
}
