//! Configuration management for the order ingestion service.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Call `dotenvy::dotenv()` first to pick up a local `.env` file.

use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `PostgreSQL` configuration
    pub postgres: PostgresConfig,
    /// Redpanda/Kafka configuration
    pub redpanda: RedpandaConfig,
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Consumer tuning
    pub ingest: IngestConfig,
}

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// `PostgreSQL` connection URL
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Connection acquire timeout in seconds
    pub connect_timeout: u64,
    /// Apply the embedded schema migrations at startup
    pub run_migrations: bool,
}

/// Redpanda/Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedpandaConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Topic carrying order events
    pub orders_topic: String,
    /// Consumer group id
    pub consumer_group: String,
    /// Where a new consumer group starts reading
    pub auto_offset_reset: String,
    /// Milliseconds to pause a partition before redelivering a rejected message
    pub redelivery_backoff_ms: u64,
    /// Upper bound for the doubling redelivery pause, in seconds
    pub max_redelivery_backoff: u64,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Prometheus exporter address; disabled when unset
    pub metrics_addr: Option<SocketAddr>,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Consumer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Messages processed concurrently
    pub max_in_flight: usize,
    /// Seconds to wait before re-subscribing after a feed failure
    pub retry_delay: u64,
}

impl Config {
    /// Load configuration from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        Self {
            postgres: PostgresConfig {
                url: lookup("DATABASE_URL").unwrap_or_else(|| database_url_from_parts(&lookup)),
                max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(10),
                connect_timeout: parse_var(&lookup, "DATABASE_CONNECT_TIMEOUT").unwrap_or(30),
                run_migrations: parse_var(&lookup, "DATABASE_RUN_MIGRATIONS").unwrap_or(true),
            },
            redpanda: RedpandaConfig {
                brokers: text("REDPANDA_BROKERS", "localhost:9092"),
                orders_topic: text("ORDERS_TOPIC", "orders"),
                consumer_group: text("CONSUMER_GROUP", "marketing-sub"),
                auto_offset_reset: text("AUTO_OFFSET_RESET", "earliest"),
                redelivery_backoff_ms: parse_var(&lookup, "REDELIVERY_BACKOFF_MS").unwrap_or(500),
                max_redelivery_backoff: parse_var(&lookup, "MAX_REDELIVERY_BACKOFF").unwrap_or(30),
            },
            server: ServerConfig {
                host: text("HOST", "0.0.0.0"),
                port: parse_var(&lookup, "PORT").unwrap_or(3001),
                metrics_addr: parse_var(&lookup, "METRICS_ADDR"),
                shutdown_timeout: parse_var(&lookup, "SHUTDOWN_TIMEOUT").unwrap_or(10),
            },
            ingest: IngestConfig {
                max_in_flight: parse_var(&lookup, "INGEST_MAX_IN_FLIGHT")
                    .filter(|n: &usize| *n > 0)
                    .unwrap_or(64),
                retry_delay: parse_var(&lookup, "INGEST_RETRY_DELAY").unwrap_or(5),
            },
        }
    }

    /// HTTP bind address (`host:port`).
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Database URL with the password masked, for logging.
    #[must_use]
    pub fn redacted_database_url(&self) -> String {
        redact_password(&self.postgres.url)
    }

    /// Pause before the first redelivery of a rejected message.
    #[must_use]
    pub const fn redelivery_backoff(&self) -> Duration {
        Duration::from_millis(self.redpanda.redelivery_backoff_ms)
    }

    /// Longest pause before a redelivery.
    #[must_use]
    pub const fn max_redelivery_backoff(&self) -> Duration {
        Duration::from_secs(self.redpanda.max_redelivery_backoff)
    }

    /// Shutdown timeout as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Compose a URL from the libpq variables (`PGUSER`, `PGPASSWORD`, `PGHOST`,
/// `PGPORT`, `PGDATABASE`).
fn database_url_from_parts(lookup: &impl Fn(&str) -> Option<String>) -> String {
    let user = lookup("PGUSER").unwrap_or_else(|| "postgres".to_string());
    let password = lookup("PGPASSWORD").unwrap_or_default();
    let host = lookup("PGHOST").unwrap_or_else(|| "localhost".to_string());
    let port = lookup("PGPORT").unwrap_or_else(|| "5432".to_string());
    let database = lookup("PGDATABASE").unwrap_or_else(|| user.clone());

    if password.is_empty() {
        format!("postgres://{user}@{host}:{port}/{database}")
    } else {
        format!("postgres://{user}:{password}@{host}:{port}/{database}")
    }
}

fn redact_password(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, location)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{location}"),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);

        assert_eq!(config.postgres.url, "postgres://postgres@localhost:5432/postgres");
        assert_eq!(config.postgres.max_connections, 10);
        assert!(config.postgres.run_migrations);
        assert_eq!(config.redpanda.orders_topic, "orders");
        assert_eq!(config.redpanda.consumer_group, "marketing-sub");
        assert_eq!(config.bind_address(), "0.0.0.0:3001");
        assert_eq!(config.server.metrics_addr, None);
        assert_eq!(config.ingest.max_in_flight, 64);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(10));
        assert_eq!(config.redelivery_backoff(), Duration::from_millis(500));
        assert_eq!(config.max_redelivery_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn redelivery_backoff_is_configurable() {
        let config = config_from(&[
            ("REDELIVERY_BACKOFF_MS", "250"),
            ("MAX_REDELIVERY_BACKOFF", "5"),
        ]);

        assert_eq!(config.redelivery_backoff(), Duration::from_millis(250));
        assert_eq!(config.max_redelivery_backoff(), Duration::from_secs(5));
    }

    #[test]
    fn database_url_composed_from_pg_variables() {
        let config = config_from(&[
            ("PGUSER", "app"),
            ("PGPASSWORD", "secret"),
            ("PGHOST", "db"),
            ("PGPORT", "6543"),
            ("PGDATABASE", "orders"),
        ]);

        assert_eq!(config.postgres.url, "postgres://app:secret@db:6543/orders");
        assert_eq!(config.redacted_database_url(), "postgres://app:***@db:6543/orders");
    }

    #[test]
    fn database_url_takes_precedence() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://u:p@h/d"),
            ("PGHOST", "ignored"),
        ]);
        assert_eq!(config.postgres.url, "postgres://u:p@h/d");
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("PORT", "not-a-port"),
            ("INGEST_MAX_IN_FLIGHT", "0"),
            ("METRICS_ADDR", "0.0.0.0:9100"),
        ]);

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.ingest.max_in_flight, 64);
        assert_eq!(config.server.metrics_addr, "0.0.0.0:9100".parse().ok());
    }

    #[test]
    fn url_without_password_is_unchanged() {
        assert_eq!(redact_password("postgres://u@h/d"), "postgres://u@h/d");
        assert_eq!(redact_password("not a url"), "not a url");
    }
}
