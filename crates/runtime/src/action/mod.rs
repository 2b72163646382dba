//! The action engine.
//!
//! An [`EngineAction`] starts from one [`Task`], usually applying a property,
//! and collects a [`TaskResult`] for everything the task tree logs, scopes or
//! mutates. Results stay on the action until [`write_action_results`]
//! persists them.

mod apply;
mod engine;
mod error;
mod handlers;
mod scope;
mod types;

pub use apply::{
    ApplyOptions, Simulation, StoreSource, apply_action, run_action, simulate_action,
    write_action_results,
};
pub use engine::{ActionEngine, CreatureSnapshot, CreatureSource};
pub use error::{ActionError, Result};
pub use scope::effective_scope;
pub use types::{
    CastSpellTask, CheckTask, DamagePropTask, EngineAction, ItemAsAmmoTask, LogContent, Mutation,
    PropTask, Removal, ResetTask, Task, TaskResult, Update,
};
