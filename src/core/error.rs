use thiserror::Error;

use crate::flow::FlowError;

/// Centralized error types for the application
///
/// Library code returns `AppResult`; the binary converts to `anyhow` at the edge.
/// The `Display` output is meant for logs only and must never be sent to a chat.
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    /// Flow definition errors (invalid document, bad references)
    #[error("Flow error: {0}")]
    Flow(#[from] FlowError),

    /// JSON (de)serialization of session data and event payloads
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;
