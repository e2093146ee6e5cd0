//! Error types for the HistIndex core library.

use thiserror::Error;

/// All errors that can occur within the HistIndex core library.
#[derive(Debug, Error)]
pub enum HistIndexError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A row was requested (or updated, or deleted) that does not exist.
    #[error("{entity} not found: {id}")]
    EntityNotFound { entity: &'static str, id: i64 },

    /// An entity failed its pre-save checks.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The opened file is not a HistIndex database.
    #[error("Invalid database: {0}")]
    InvalidDatabase(String),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Data could not be serialised to or from JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias that pins the error type to [`HistIndexError`].
pub type Result<T> = std::result::Result<T, HistIndexError>;

impl HistIndexError {
    /// Shorthand for [`HistIndexError::EntityNotFound`].
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::EntityNotFound { entity, id }
    }

    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Couldn't save ({e})"),
            Self::EntityNotFound { entity, .. } => format!("{entity} no longer exists"),
            Self::ValidationFailed(msg) => msg.clone(),
            Self::InvalidDatabase(_) => "Could not open database file".to_string(),
            Self::Io(e) => format!("File error: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
        }
    }
}
