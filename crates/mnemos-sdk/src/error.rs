//! SDK Error Types
//!
//! Defines error types for the Mnemos SDK.

use thiserror::Error;

/// SDK Result type alias
pub type SDKResult<T> = Result<T, SDKError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum SDKError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Store error that is neither a lookup miss nor a SQLite failure
    #[error("store error: {0}")]
    Core(mnemos_core::Error),

    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Embedding service error
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Naming service error
    #[error("naming error: {message}")]
    Naming { message: String },

    /// Entry not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Timeout error
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// HTTP transport or status error from an external service
    #[error("http error{}: {message}", status.map(|s| format!(" {s}")).unwrap_or_default())]
    Http { status: Option<u16>, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SDKError {
    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a naming error
    pub fn naming(message: impl Into<String>) -> Self {
        Self::Naming {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create an HTTP error
    pub fn http(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Whether retrying the same call later may succeed
    ///
    /// Timeouts, rate limiting, 5xx responses and transport failures are
    /// transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http { status: None, .. } => true,
            Self::Http { status: Some(code), .. } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

impl From<mnemos_core::Error> for SDKError {
    fn from(err: mnemos_core::Error) -> Self {
        match err {
            mnemos_core::Error::NotFound { entity_type, id } => Self::NotFound { entity_type, id },
            mnemos_core::Error::Database(e) => Self::Database(e),
            other => Self::Core(other),
        }
    }
}

impl From<reqwest::Error> for SDKError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
