//! Unified error types surfaced by the runtime API.
//!
//! Wraps failures from stores, compute passes and action application so
//! clients can bubble them up with consistent context.
use creature_core::{EngineError, ErrorSeverity, TreeError};
use thiserror::Error;

pub use crate::action::ActionError;
pub use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, RuntimeError>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("creature {0} not found")]
    CreatureNotFound(String),

    #[error("action {0} not found")]
    ActionNotFound(String),

    #[error("session {0} was already released")]
    SessionReleased(u64),

    #[error("compute worker join failed")]
    WorkerJoin(#[source] tokio::task::JoinError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl EngineError for RuntimeError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CreatureNotFound(_) | Self::ActionNotFound(_) | Self::SessionReleased(_) => {
                ErrorSeverity::Validation
            }
            Self::WorkerJoin(_) => ErrorSeverity::Internal,
            Self::Action(error) => error.severity(),
            Self::Tree(error) => error.severity(),
            Self::Repository(error) => error.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::CreatureNotFound(_) => "RUNTIME_CREATURE_NOT_FOUND",
            Self::ActionNotFound(_) => "RUNTIME_ACTION_NOT_FOUND",
            Self::SessionReleased(_) => "RUNTIME_SESSION_RELEASED",
            Self::WorkerJoin(_) => "RUNTIME_WORKER_JOIN",
            Self::Action(error) => error.error_code(),
            Self::Tree(error) => error.error_code(),
            Self::Repository(error) => error.error_code(),
        }
    }
}
