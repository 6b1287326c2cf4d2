//! Error types for mnemos-core.

use thiserror::Error;

/// Result type alias using mnemos-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for store operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Lookup errors
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    // Validation errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the backing store itself failed (as opposed to a bad request)
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::LockPoisoned | Self::Io(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
