use thiserror::Error;

/// Errors that can occur during vector store operations
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Transient failure talking to the backend (network, overload, restart).
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Invalid query provided
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Query vector does not match the dimension of the stored vectors
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other errors
    #[error("Vector store error: {0}")]
    Other(String),
}

impl VectorStoreError {
    /// Whether retrying the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, VectorStoreError::Unavailable(_))
    }
}

/// A filter document that could not be parsed into predicates.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("invalid filter on `{field}`: {reason}")]
pub struct FilterError {
    /// Metadata field the bad predicate was attached to.
    pub field: String,
    /// What was wrong with it.
    pub reason: String,
}

impl FilterError {
    pub(crate) fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, VectorStoreError>;
