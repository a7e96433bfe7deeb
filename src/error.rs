//! Error types for loadstone.

use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {key} ({hint})")]
    MissingRequired { key: String, hint: String },

    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("failed to read configuration: {0}")]
    ParseError(String),
}

/// Store errors. Never retried inside the core; retry policy belongs to
/// the caller.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("store operation `{op}` timed out after {timeout_secs}s")]
    Timeout { op: &'static str, timeout_secs: u64 },

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

impl From<deadpool_postgres::PoolError> for DatabaseError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        DatabaseError::Pool(e.to_string())
    }
}

/// HTTP server lifecycle errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to start server: {reason}")]
    StartupFailed { reason: String },
}
