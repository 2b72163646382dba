use crate::error::{EngineError, ErrorSeverity};

/// Structurally invalid calculation text.
///
/// This is the only failure that aborts resolution: everything else becomes an
/// error node recorded in a [`Context`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum FormulaError {
    #[error("Unexpected character `{found}` at position {position}")]
    UnexpectedCharacter { found: char, position: usize },

    #[error("Unexpected {found} at position {position}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        position: usize,
    },

    #[error("Unexpected end of input, expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("Unterminated string starting at position {position}")]
    UnterminatedString { position: usize },
}

impl EngineError for FormulaError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::UnexpectedCharacter { .. } => "FORMULA_UNEXPECTED_CHARACTER",
            Self::UnexpectedToken { .. } => "FORMULA_UNEXPECTED_TOKEN",
            Self::UnexpectedEnd { .. } => "FORMULA_UNEXPECTED_END",
            Self::UnterminatedString { .. } => "FORMULA_UNTERMINATED_STRING",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub enum CalculationErrorKind {
    Parse,
    Evaluation,
}

/// A recorded, non-fatal problem with one calculation.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CalculationError {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: CalculationErrorKind,
    pub message: String,
}

impl CalculationError {
    pub fn parse(error: &FormulaError) -> Self {
        Self {
            kind: CalculationErrorKind::Parse,
            message: error.to_string(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self {
            kind: CalculationErrorKind::Evaluation,
            message: message.into(),
        }
    }
}

/// Accumulates errors across one or more resolve calls.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Context {
    pub errors: Vec<CalculationError>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an evaluation error once; repeats of the same message are ignored.
    pub fn error(&mut self, message: impl Into<String>) {
        self.push(CalculationError::evaluation(message));
    }

    pub fn push(&mut self, error: CalculationError) {
        if !self.errors.contains(&error) {
            self.errors.push(error);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}
