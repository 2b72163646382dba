//! Failures that abort applying an action.
//!
//! Rule problems met along the way (missing uses, unknown variables, a buff
//! remover without a parent buff) are logged into the action instead; only
//! conditions that leave nothing sensible to log surface here.

use creature_core::property::FieldError;
use creature_core::{CreatureId, EngineError, ErrorSeverity, PropertyId, TreeError};
use thiserror::Error;

use crate::api::{DecisionKind, DecisionRequest};
use crate::repository::RepositoryError;

pub type Result<T> = std::result::Result<T, ActionError>;

#[derive(Debug, Error)]
pub enum ActionError {
    /// The provider cannot answer without asking a person.
    #[error("input requested: {}", .0.kind())]
    InputRequested(Box<DecisionRequest>),

    #[error("property {0} not found")]
    PropertyNotFound(PropertyId),

    #[error("creature {0} not found")]
    CreatureNotFound(CreatureId),

    #[error("action exceeded {limit} tasks")]
    TaskLimitExceeded { limit: usize },

    #[error("{0} needs a target")]
    MissingTarget(PropertyId),

    #[error("invalid task: {0}")]
    InvalidTask(String),

    #[error("Cannot step through unless simulating")]
    StepThroughRequiresSimulation,

    #[error("expected a {expected} decision, found {found}")]
    DecisionMismatch {
        expected: DecisionKind,
        found: DecisionKind,
    },

    #[error("no recorded decision left for {0}")]
    DecisionsExhausted(DecisionKind),

    #[error("recorded dice do not fit the roll: {0}")]
    DiceMismatch(String),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl ActionError {
    /// The pending question, when the action stopped to ask one.
    pub fn input_request(&self) -> Option<&DecisionRequest> {
        match self {
            Self::InputRequested(request) => Some(request),
            _ => None,
        }
    }
}

impl EngineError for ActionError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InputRequested(_) => ErrorSeverity::Recoverable,
            Self::PropertyNotFound(_)
            | Self::CreatureNotFound(_)
            | Self::MissingTarget(_)
            | Self::InvalidTask(_)
            | Self::StepThroughRequiresSimulation
            | Self::DecisionMismatch { .. }
            | Self::DecisionsExhausted(_)
            | Self::DiceMismatch(_)
            | Self::Field(_) => ErrorSeverity::Validation,
            Self::TaskLimitExceeded { .. } => ErrorSeverity::Internal,
            Self::Tree(error) => error.severity(),
            Self::Repository(error) => error.severity(),
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::InputRequested(_) => "ACTION_INPUT_REQUESTED",
            Self::PropertyNotFound(_) => "ACTION_PROPERTY_NOT_FOUND",
            Self::CreatureNotFound(_) => "ACTION_CREATURE_NOT_FOUND",
            Self::TaskLimitExceeded { .. } => "ACTION_TASK_LIMIT_EXCEEDED",
            Self::MissingTarget(_) => "ACTION_MISSING_TARGET",
            Self::InvalidTask(_) => "ACTION_INVALID_TASK",
            Self::StepThroughRequiresSimulation => "ACTION_STEP_THROUGH_REQUIRES_SIMULATION",
            Self::DecisionMismatch { .. } => "ACTION_DECISION_MISMATCH",
            Self::DecisionsExhausted(_) => "ACTION_DECISIONS_EXHAUSTED",
            Self::DiceMismatch(_) => "ACTION_DICE_MISMATCH",
            Self::Field(_) => "ACTION_FIELD",
            Self::Tree(error) => error.error_code(),
            Self::Repository(error) => error.error_code(),
        }
    }
}
