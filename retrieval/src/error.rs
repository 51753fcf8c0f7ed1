use crate::capability::Capability;
use retrieval_vector_store::VectorStoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Unknown backend `{backend}`")]
    UnknownBackend { backend: String },

    #[error("Unknown strategy `{strategy}` requested for backend `{backend}`")]
    UnknownStrategy { strategy: String, backend: String },

    #[error("Invalid config for strategy `{strategy}` on backend `{backend}`: `{field}` {constraint}")]
    InvalidConfig {
        strategy: String,
        backend: String,
        field: String,
        constraint: String,
    },

    #[error("Strategy `{strategy}` cannot run on backend `{backend}`: {detail}")]
    IncompatibleBackend {
        strategy: String,
        backend: String,
        missing: Vec<Capability>,
        detail: String,
    },

    #[error("No compatible strategy for backend `{backend}` (use case: {use_case})")]
    NoCompatibleStrategy { backend: String, use_case: String },

    #[error("Backend `{backend}` unavailable while running `{strategy}`: {reason}")]
    BackendUnavailable {
        strategy: String,
        backend: String,
        reason: String,
    },

    #[error("Backend `{backend}` rejected a search from `{strategy}`: {reason}")]
    BackendRejected {
        strategy: String,
        backend: String,
        reason: String,
    },

    #[error(
        "Strategy `{strategy}` on backend `{backend}` was cancelled after {completed} of {total} sub-queries"
    )]
    PartialFusionAborted {
        strategy: String,
        backend: String,
        completed: usize,
        total: usize,
    },

    #[error("Query embedding failed for strategy `{strategy}`: {reason}")]
    EmbeddingFailed { strategy: String, reason: String },
}

impl RetrievalError {
    /// Configuration and compatibility failures. Retrying cannot change the
    /// outcome, so these are always surfaced immediately.
    pub fn is_deterministic(&self) -> bool {
        matches!(
            self,
            RetrievalError::UnknownBackend { .. }
                | RetrievalError::UnknownStrategy { .. }
                | RetrievalError::InvalidConfig { .. }
                | RetrievalError::IncompatibleBackend { .. }
                | RetrievalError::NoCompatibleStrategy { .. }
        )
    }

    pub(crate) fn incompatible(
        strategy: impl Into<String>,
        backend: impl Into<String>,
        missing: Vec<Capability>,
    ) -> Self {
        let names: Vec<&str> = missing.iter().map(Capability::as_str).collect();
        RetrievalError::IncompatibleBackend {
            strategy: strategy.into(),
            backend: backend.into(),
            detail: format!("missing required capabilities: {}", names.join(", ")),
            missing,
        }
    }

    pub(crate) fn from_backend(err: VectorStoreError, strategy: &str, backend: &str) -> Self {
        if err.is_transient() {
            RetrievalError::BackendUnavailable {
                strategy: strategy.to_string(),
                backend: backend.to_string(),
                reason: err.to_string(),
            }
        } else {
            RetrievalError::BackendRejected {
                strategy: strategy.to_string(),
                backend: backend.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// A single schema violation found while validating a strategy config.
///
/// `field` is a dotted path into the raw config (`children[1].config.initial_k`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigViolation {
    pub field: String,
    pub constraint: String,
}

impl ConfigViolation {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }

    pub fn into_error(self, strategy: &str, backend: &str) -> RetrievalError {
        RetrievalError::InvalidConfig {
            strategy: strategy.to_string(),
            backend: backend.to_string(),
            field: self.field,
            constraint: self.constraint,
        }
    }
}

impl std::fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}` {}", self.field, self.constraint)
    }
}

impl std::error::Error for ConfigViolation {}

/// Failure reported by the embedding collaborator.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct EmbeddingError(pub String);

pub type Result<T> = std::result::Result<T, RetrievalError>;
