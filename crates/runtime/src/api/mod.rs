//! Public runtime API surface.
//!
//! This module gathers the types exposed to consumers of the runtime crate so
//! other layers can stay focused on orchestration, sessions, or stores.

pub mod decisions;
pub mod errors;
pub mod providers;

pub use decisions::{Advantage, CastOptions, CheckParams, Decision, DecisionKind, DecisionRequest};
pub use errors::{Result, RuntimeError};
pub use providers::{
    DefaultInputProvider, InputProvider, InteractiveInputProvider, RecordingInputProvider,
    ReplayInputProvider,
};
