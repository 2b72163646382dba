//! Common error infrastructure for creature-core.
//!
//! Domain errors live next to the code that raises them (`FormulaError` in
//! [`crate::formula`], `TreeError` in [`crate::property`]). This module holds
//! the pieces they share: a severity scale and the [`EngineError`] trait that
//! lets the runtime log and classify any of them uniformly.
//!
//! Most problems a compute pass meets are *not* Rust errors at all. Unknown
//! variables, bad arithmetic and dependency loops are recorded as data on the
//! property or creature and the pass keeps going. Only failures that make the
//! input unusable surface as `Err`.

/// Severity level of an error, used for categorization and recovery strategies.
///
/// - **Recoverable**: the caller may retry, possibly with different input
/// - **Validation**: the input is invalid and should be rejected
/// - **Internal**: an invariant was violated; indicates a bug
/// - **Fatal**: stored data is corrupted and processing cannot continue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ErrorSeverity {
    /// Retry with the same or different input may succeed.
    ///
    /// Examples: a decision is still outstanding, a store lock was contended.
    Recoverable,

    /// Invalid input, should not be retried without changes.
    ///
    /// Examples: malformed calculation text, unknown property id.
    Validation,

    /// Unexpected state inconsistency.
    ///
    /// Examples: duplicate property ids inside one creature tree.
    Internal,

    /// Stored state is unusable.
    Fatal,
}

impl ErrorSeverity {
    /// Returns a human-readable description of this severity level.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Recoverable => "recoverable",
            Self::Validation => "validation",
            Self::Internal => "internal",
            Self::Fatal => "fatal",
        }
    }

    /// Returns true if this error is potentially recoverable.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable)
    }

    /// Returns true if this error indicates an internal bug.
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal | Self::Fatal)
    }
}

/// Common trait for every error type in the workspace.
///
/// # Implementation Guidelines
///
/// - Use `#[derive(thiserror::Error)]` for Display/Error impl
/// - Classify severity based on recoverability, not impact
/// - Error codes are stable SCREAMING_SNAKE identifiers used in logs and tests
pub trait EngineError: core::fmt::Display + core::fmt::Debug {
    /// Returns the severity level of this error.
    fn severity(&self) -> ErrorSeverity;

    /// Returns a static string identifier for this error variant.
    fn error_code(&self) -> &'static str {
        core::any::type_name::<Self>()
    }
}
