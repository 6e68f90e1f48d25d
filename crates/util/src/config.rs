use std::{env, fmt, net::SocketAddr, time::Duration};

use super::{optional_env, server_bind_address, DEFAULT_DATABASE_URL};

const DEFAULT_LIST_CACHE_MAX_ENTRIES: usize = 128;
const DEFAULT_LIST_CACHE_TTL_SECS: u64 = 30;

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the signed email relay used by contact notifications.
#[derive(Clone)]
pub struct MailRelayConfig {
    pub url: String,
    pub secret: Vec<u8>,
    pub admin_email: String,
}

impl fmt::Debug for MailRelayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailRelayConfig")
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub admin_token: Option<String>,
    pub mail_relay: Option<MailRelayConfig>,
    pub list_cache_max_entries: usize,
    pub list_cache_ttl: Duration,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("mail_relay", &self.mail_relay)
            .field("list_cache_max_entries", &self.list_cache_max_entries)
            .field("list_cache_ttl", &self.list_cache_ttl)
            .finish()
    }
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let database_url =
            optional_env("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let admin_token = optional_env("ADMIN_TOKEN");
        let mail_relay = mail_relay_from_env()?;

        let list_cache_max_entries = parse_number(
            "LIST_CACHE_MAX_ENTRIES",
            DEFAULT_LIST_CACHE_MAX_ENTRIES as u64,
        )? as usize;
        let list_cache_ttl = Duration::from_secs(parse_number(
            "LIST_CACHE_TTL_SECS",
            DEFAULT_LIST_CACHE_TTL_SECS,
        )?);

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            admin_token,
            mail_relay,
            list_cache_max_entries,
            list_cache_ttl,
        })
    }
}

fn mail_relay_from_env() -> Result<Option<MailRelayConfig>, ConfigError> {
    let Some(url) = optional_env("MAIL_RELAY_URL") else {
        return Ok(None);
    };
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::InvalidValue {
            key: "MAIL_RELAY_URL",
            value: url,
        });
    }
    let secret = optional_env("MAIL_RELAY_SECRET").ok_or(ConfigError::Missing {
        key: "MAIL_RELAY_SECRET",
        required_by: "MAIL_RELAY_URL",
    })?;
    let admin_email = optional_env("ADMIN_EMAIL").ok_or(ConfigError::Missing {
        key: "ADMIN_EMAIL",
        required_by: "MAIL_RELAY_URL",
    })?;

    Ok(Some(MailRelayConfig {
        url,
        secret: secret.into_bytes(),
        admin_email,
    }))
}

fn parse_number(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match optional_env(key) {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidValue {
        key: &'static str,
        value: String,
    },
    Missing {
        key: &'static str,
        required_by: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidValue { key, value } => write!(f, "invalid {key} value: {value}"),
            Self::Missing { key, required_by } => {
                write!(f, "{key} must be set when {required_by} is configured")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_env::ENV_GUARD;
    use crate::DEFAULT_BIND_ADDR;

    const KEYS: &[&str] = &[
        "APP_ENV",
        "APP_BIND_ADDR",
        "DATABASE_URL",
        "ADMIN_TOKEN",
        "MAIL_RELAY_URL",
        "MAIL_RELAY_SECRET",
        "ADMIN_EMAIL",
        "LIST_CACHE_MAX_ENTRIES",
        "LIST_CACHE_TTL_SECS",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn loads_defaults_in_development() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();

        let config = AppConfig::from_env().expect("config should load with defaults");
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert_eq!(config.database_url, DEFAULT_DATABASE_URL);
        assert!(config.admin_token.is_none());
        assert!(config.mail_relay.is_none());
        assert_eq!(config.list_cache_max_entries, 128);
        assert_eq!(config.list_cache_ttl, Duration::from_secs(30));
    }

    #[test]
    fn rejects_invalid_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "invalid");

        let err = AppConfig::from_env().expect_err("invalid env should error");
        assert!(matches!(err, ConfigError::InvalidEnvironment(value) if value == "invalid"));

        clear_env();
    }

    #[test]
    fn parses_production_environment() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("APP_ENV", "production");
        env::set_var("APP_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("ADMIN_TOKEN", "s3cret");
        env::set_var("LIST_CACHE_TTL_SECS", "5");

        let config = AppConfig::from_env().expect("config should load");
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:9000");
        assert_eq!(config.admin_token.as_deref(), Some("s3cret"));
        assert_eq!(config.list_cache_ttl, Duration::from_secs(5));
        assert!(!format!("{config:?}").contains("s3cret"));

        clear_env();
    }

    #[test]
    fn relay_requires_secret_and_admin_email() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("MAIL_RELAY_URL", "https://relay.example/exec");

        let err = AppConfig::from_env().expect_err("missing secret should error");
        assert!(matches!(
            err,
            ConfigError::Missing {
                key: "MAIL_RELAY_SECRET",
                ..
            }
        ));

        env::set_var("MAIL_RELAY_SECRET", "relay-secret");
        env::set_var("ADMIN_EMAIL", "owner@example.com");
        let config = AppConfig::from_env().expect("relay config should load");
        let relay = config.mail_relay.expect("relay configured");
        assert_eq!(relay.secret, b"relay-secret");
        assert_eq!(relay.admin_email, "owner@example.com");

        clear_env();
    }

    #[test]
    fn rejects_non_numeric_cache_size() {
        let _guard = ENV_GUARD.lock().expect("env guard poisoned");
        clear_env();
        env::set_var("LIST_CACHE_MAX_ENTRIES", "lots");

        let err = AppConfig::from_env().expect_err("non numeric should error");
        assert_eq!(err.to_string(), "invalid LIST_CACHE_MAX_ENTRIES value: lots");

        clear_env();
    }
}
