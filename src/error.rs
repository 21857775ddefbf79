//! Error types for linkgate.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Environment variable {0} is not valid unicode")]
    NotUnicode(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Row decode failed: {0}")]
    Decode(String),

    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Messaging-platform (Bot API) errors.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    /// The platform answered but refused the call (`ok: false`).
    #[error("{method} rejected: {description}")]
    Rejected {
        method: &'static str,
        description: String,
    },

    #[error("{method} returned an unusable response: {reason}")]
    InvalidResponse {
        method: &'static str,
        reason: String,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for the service.
pub type Result<T> = std::result::Result<T, Error>;
