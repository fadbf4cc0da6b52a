//! Error types for the intake bot.

/// Top-level error type for the bot process.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
///
/// Every variant is a repository failure from the form flow's point of view:
/// the session is kept and the user is told to retry.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Rejection of a single field value. Always recoverable by re-prompting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected surname, given name and patronymic separated by single spaces")]
    MalformedName,

    #[error("expected a date in DD.MM.YYYY format")]
    BadDateFormat,

    #[error("date must lie between 01.01.1900 and today")]
    DateOutOfRange,

    #[error("expected a whole number")]
    NotAnInteger,

    #[error("value must be between {min} and {max}")]
    OutOfRange { min: i64, max: i64 },

    #[error("please pick one of the offered options")]
    UnknownChoice,
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
