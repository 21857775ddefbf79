//! Configuration for linkgate.
//!
//! Everything is resolved from environment variables; a local `.env` is
//! loaded via dotenvy early in startup and never overrides explicit vars.

use std::path::PathBuf;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Main configuration for the service.
#[derive(Debug, Clone)]
pub struct Config {
    pub http: HttpConfig,
    pub bot: BotConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Platform bot token; also keys the session-payload verification.
    pub token: SecretString,
    /// Bot username, used to render mini-app deep links.
    pub username: String,
    /// Bot API base URL (overridable for tests and local API servers).
    pub api_base_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the local libSQL database file.
    pub path: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            http: HttpConfig::resolve()?,
            bot: BotConfig::resolve()?,
            database: DatabaseConfig::resolve()?,
        })
    }
}

impl HttpConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            host: optional_env("HTTP_HOST")?.unwrap_or_else(|| "0.0.0.0".to_string()),
            port: optional_env("HTTP_PORT")?
                .map(|s| s.parse())
                .transpose()
                .map_err(|e| ConfigError::InvalidValue {
                    key: "HTTP_PORT".to_string(),
                    message: format!("must be a valid port number: {e}"),
                })?
                .unwrap_or(8080),
        })
    }
}

impl BotConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            token: SecretString::from(require_env("BOT_TOKEN")?),
            username: require_env("BOT_USERNAME")?,
            api_base_url: optional_env("BOT_API_BASE_URL")?
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
        })
    }
}

impl DatabaseConfig {
    fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            path: optional_env("LINKGATE_DB_PATH")?
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("linkgate.db")),
        })
    }
}

/// Read an env var, treating empty/whitespace values as unset.
fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(key.to_string())),
    }
}

fn require_env(key: &str) -> Result<String, ConfigError> {
    optional_env(key)?.ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}
