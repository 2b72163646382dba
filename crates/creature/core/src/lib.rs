//! Deterministic creature rules: properties, calculations and the compute pass.
//!
//! `creature-core` owns the canonical model of a creature's property tree and
//! every rule that derives values from it. It performs no I/O and keeps no
//! clock; [`compute::compute`] is a pure function from stored properties to
//! derived layers, variables and the minimal updates that persist them. The
//! runtime crate layers stores, sessions and the action engine on top.
pub mod compute;
pub mod config;
pub mod error;
pub mod formula;
pub mod property;
pub mod tags;

pub use compute::{
    ComputeError, ComputeErrorKind, ComputeOutcome, Contribution, DependencyGraph, EdgeKind,
    EffectStack, NodeKey, compute, proficiency_bonus,
};
pub use config::EngineConfig;
pub use error::{EngineError, ErrorSeverity};
pub use formula::{
    CalculationError, CalculationErrorKind, Context, DiceRequest, DiceSource, FormulaError, Node,
    NoDice, Overlay, QueuedRolls, ResolveLevel, RolledDice, Scope, ScopeEntry, SymbolTable, Value,
    parse, resolve,
};
pub use property::{
    CalculationOutcome, CreatureId, DerivedPath, DerivedState, DerivedValue, InactiveReasons,
    Property, PropertyId, PropertyKind, PropertyTree, PropertyType, PropertyUpdate, RootRef,
    TreeError, TriggerFamily, TriggerIds,
};
pub use tags::{ExtraTags, TagIndex, TagOperation, TagTargeting};
