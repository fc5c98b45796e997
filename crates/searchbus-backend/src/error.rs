//! Error types for search backends

use thiserror::Error;

/// Search backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("[{0}] missing")]
    IndexMissing(String),

    #[error("[{doc_type}][{id}]: version conflict, current [{current}], provided [{provided}]")]
    VersionConflict {
        doc_type: String,
        id: String,
        current: i64,
        provided: i64,
    },

    #[error("[{doc_type}][{id}]: document already exists")]
    DocumentAlreadyExists { doc_type: String, id: String },

    #[error("index_template [{0}] already exists")]
    TemplateAlreadyExists(String),

    #[error("No search context found for id [{0}]")]
    SearchContextMissing(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine error ({status}): {reason}")]
    Engine { status: u16, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BackendError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest(reason.into())
    }

    /// Whether the error reports that a targeted index does not exist.
    pub fn is_index_missing(&self) -> bool {
        matches!(self, Self::IndexMissing(_))
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
