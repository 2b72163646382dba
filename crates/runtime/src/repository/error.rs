//! Error types raised by store implementations.

use creature_core::{EngineError, ErrorSeverity};
use thiserror::Error;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("store lock was poisoned")]
    LockPoisoned,

    #[error("property {0} not found")]
    PropertyNotFound(String),

    #[error("creature {0} not found")]
    CreatureNotFound(String),

    #[error("action {0} not found")]
    ActionNotFound(String),

    #[error("{kind} {id} already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl EngineError for RepositoryError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::LockPoisoned => ErrorSeverity::Internal,
            Self::PropertyNotFound(_)
            | Self::CreatureNotFound(_)
            | Self::ActionNotFound(_)
            | Self::AlreadyExists { .. } => ErrorSeverity::Validation,
            Self::Serialization(_) => ErrorSeverity::Fatal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::LockPoisoned => "STORE_LOCK_POISONED",
            Self::PropertyNotFound(_) => "STORE_PROPERTY_NOT_FOUND",
            Self::CreatureNotFound(_) => "STORE_CREATURE_NOT_FOUND",
            Self::ActionNotFound(_) => "STORE_ACTION_NOT_FOUND",
            Self::AlreadyExists { .. } => "STORE_ALREADY_EXISTS",
            Self::Serialization(_) => "STORE_SERIALIZATION",
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
