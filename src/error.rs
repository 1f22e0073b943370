//! Error types for signal-relay.

use std::time::Duration;

use crate::session::SignalField;

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

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
}

/// Webhook delivery errors. Every variant is reported to the user the same way.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Webhook request failed: {0}")]
    Transport(String),

    #[error("Webhook request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
}

/// Signal draft errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Required field {0} has not been collected")]
    MissingField(SignalField),

    #[error("Field {0} cannot be skipped")]
    NotOptional(SignalField),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: SignalField, reason: String },
}

/// Result type alias for the bot.
pub type Result<T> = std::result::Result<T, Error>;
