//! Async orchestration for creature sheets.
//!
//! This crate wires the pure compute engine in `creature-core` to stores, a
//! change feed, loaded-creature sessions and the action engine. Consumers embed
//! [`Runtime`] to compute creatures, apply actions, and read live sheets
//! through [`SessionHandle`].
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the orchestrator and builder
//! - [`api`] exposes errors, decisions and input providers
//! - [`action`] applies actions and writes their results
//! - [`compute`] runs compute passes against the stores
//! - [`session`] keeps loaded creatures current and recomputed
//! - [`events`] provides the topic-based change feed
//! - [`repository`] holds the store traits and in-memory stores
pub mod action;
pub mod api;
pub mod compute;
pub mod events;
pub mod repository;
pub mod runtime;
pub mod session;

mod workers;

pub use action::{
    ActionError, ApplyOptions, EngineAction, LogContent, Mutation, Simulation, Task, TaskResult,
    apply_action, run_action, simulate_action, write_action_results,
};
pub use api::{
    Decision, DecisionRequest, DefaultInputProvider, InputProvider, InteractiveInputProvider,
    RecordingInputProvider, ReplayInputProvider, Result, RuntimeError,
};
pub use compute::{ComputeSummary, compute_creature};
pub use events::{ChangeEvent, ChangeFeed, Topic};
pub use repository::{
    ActionStore, Creature, CreatureStore, LogEntry, LogStore, PropertyStore, RepositoryError,
    Stores, VariablesStore,
};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeConfig};
pub use session::{LoadedCreature, SessionHandle, SessionRegistry};
