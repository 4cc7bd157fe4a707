//! Admin configuration module.
//!
//! Configuration is loaded from environment variables (after `.env`) with
//! fallback to defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tienda_db::DbConfig;

/// Admin CLI configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminConfig {
    /// SQLite connection string
    pub database_url: String,

    /// Accepted for compatibility with hosted deployments; SQLite has no TLS
    pub database_ssl: bool,

    /// Pool size
    pub max_connections: u32,

    pub min_connections: u32,

    /// Pool acquire timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle connection lifetime in seconds
    pub idle_timeout_secs: u64,

    /// Optional busy timeout in milliseconds
    pub statement_timeout_ms: Option<u64>,
}

impl AdminConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let config = AdminConfig {
            database_url: lookup("DATABASE_URL")
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| "sqlite://tienda.db".to_string()),

            database_ssl: lookup("DATABASE_SSL")
                .map(|v| v.trim().eq_ignore_ascii_case("true"))
                .unwrap_or(false),

            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 30)?,
            min_connections: parse_or(&lookup, "DB_MIN_CONNECTIONS", 1)?,
            connect_timeout_secs: parse_or(&lookup, "DB_CONNECT_TIMEOUT_SECS", 5)?,
            idle_timeout_secs: parse_or(&lookup, "DB_IDLE_TIMEOUT_SECS", 30)?,

            statement_timeout_ms: match lookup("DB_STATEMENT_TIMEOUT_MS") {
                Some(raw) => Some(parse(&raw, "DB_STATEMENT_TIMEOUT_MS")?),
                None => None,
            },
        };

        if config.max_connections == 0 || config.min_connections > config.max_connections {
            return Err(ConfigError::Inconsistent(format!(
                "DB_MIN_CONNECTIONS ({}) must not exceed DB_MAX_CONNECTIONS ({}), which must be positive",
                config.min_connections, config.max_connections
            )));
        }

        Ok(config)
    }

    /// Pool settings for [`tienda_db::Database::new`].
    pub fn to_db_config(&self) -> DbConfig {
        DbConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .idle_timeout(Some(Duration::from_secs(self.idle_timeout_secs)))
            .busy_timeout(self.statement_timeout_ms.map(Duration::from_millis))
    }
}

fn parse<T: FromStr>(raw: &str, key: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(raw) => parse(&raw, key),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<AdminConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AdminConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.database_url, "sqlite://tienda.db");
        assert!(!config.database_ssl);
        assert_eq!(config.max_connections, 30);
        assert_eq!(config.min_connections, 1);
        assert_eq!(config.statement_timeout_ms, None);

        let db = config.to_db_config();
        assert_eq!(db.connect_timeout, Duration::from_secs(5));
        assert_eq!(db.idle_timeout, Some(Duration::from_secs(30)));
        assert!(db.run_migrations);
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("DATABASE_URL", "sqlite://data/shop.db"),
            ("DATABASE_SSL", "TRUE"),
            ("DB_MAX_CONNECTIONS", "8"),
            ("DB_STATEMENT_TIMEOUT_MS", " 2500 "),
        ])
        .unwrap();

        assert_eq!(config.database_url, "sqlite://data/shop.db");
        assert!(config.database_ssl);
        assert_eq!(config.to_db_config().max_connections, 8);
        assert_eq!(
            config.to_db_config().busy_timeout,
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = from_pairs(&[("DB_IDLE_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref key) if key == "DB_IDLE_TIMEOUT_SECS"));
    }

    #[test]
    fn test_min_above_max() {
        let err = from_pairs(&[("DB_MAX_CONNECTIONS", "2"), ("DB_MIN_CONNECTIONS", "3")]).unwrap_err();
        assert!(matches!(err, ConfigError::Inconsistent(_)));
    }
}
