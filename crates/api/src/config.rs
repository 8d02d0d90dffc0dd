//! Application configuration

use std::env;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub port: u16,
    pub bind_host: IpAddr,

    // Chat store (in-memory when unset)
    pub database_url: Option<String>,
    pub database_max_connections: u32,

    // Operations
    pub log_format: LogFormat,
    pub shutdown_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Server
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("PORT", "must be a port number"))?,
            bind_host: env::var("BIND_HOST")
                .unwrap_or_else(|_| "0.0.0.0".to_string())
                .parse()
                .map_err(|_| ConfigError::Invalid("BIND_HOST", "must be an IP address"))?,

            // Chat store
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            database_max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),

            // Operations
            log_format: match env::var("LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                Ok("pretty") | Err(_) => LogFormat::Pretty,
                Ok(_) => {
                    return Err(ConfigError::Invalid("LOG_FORMAT", "must be json or pretty"));
                }
            },
            shutdown_timeout: Duration::from_secs(
                env::var("SHUTDOWN_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "30".to_string())
                    .parse()
                    .unwrap_or(30),
            ),
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "PORT",
        "BIND_HOST",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "LOG_FORMAT",
        "SHUTDOWN_TIMEOUT_SECS",
    ];

    /// Helper to clear env vars before and after tests
    fn cleanup_config() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        cleanup_config();

        let config = Config::from_env().unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:3001");
        assert!(config.database_url.is_none());
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    #[serial]
    fn test_overrides() {
        cleanup_config();
        env::set_var("PORT", "8080");
        env::set_var("BIND_HOST", "127.0.0.1");
        env::set_var("DATABASE_URL", "postgres://relay@localhost/relay");
        env::set_var("LOG_FORMAT", "json");
        env::set_var("SHUTDOWN_TIMEOUT_SECS", "5");

        let config = Config::from_env().unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://relay@localhost/relay")
        );
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(5));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_invalid_port_rejected() {
        cleanup_config();
        env::set_var("PORT", "not-a-port");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("PORT", _))
        ));

        env::set_var("PORT", "70000");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("PORT", _))
        ));

        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_empty_database_url_means_in_memory() {
        cleanup_config();
        env::set_var("DATABASE_URL", "");
        assert!(Config::from_env().unwrap().database_url.is_none());
        cleanup_config();
    }

    #[test]
    #[serial]
    fn test_unknown_log_format_rejected() {
        cleanup_config();
        env::set_var("LOG_FORMAT", "xml");
        assert!(matches!(
            Config::from_env(),
            Err(ConfigError::Invalid("LOG_FORMAT", _))
        ));
        cleanup_config();
    }
}
