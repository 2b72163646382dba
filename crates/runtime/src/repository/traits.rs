//! Store contracts for creatures, their properties, variables, logs and
//! pending actions.
//!
//! All stores are synchronous and shareable across tasks. Implementations that
//! back a live session must publish a [`ChangeEvent`](crate::events::ChangeEvent)
//! for every write so watchers can keep their caches current.

use creature_core::{Property, PropertyType, PropertyUpdate, Scope};

use super::error::Result;
use super::types::{Creature, CreatureUpdate, LogEntry};
use crate::action::EngineAction;

/// Store for properties, queried by id, by root creature and by type.
pub trait PropertyStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Property>>;

    /// Non-removed properties of one creature, in tree order.
    fn for_root(&self, creature_id: &str) -> Result<Vec<Property>>;

    /// Non-removed properties of one type across a creature, in tree order.
    fn of_type(&self, creature_id: &str, kind: PropertyType) -> Result<Vec<Property>> {
        Ok(self
            .for_root(creature_id)?
            .into_iter()
            .filter(|property| property.property_type() == kind)
            .collect())
    }

    /// Inserts a new property. Fails when the id is taken.
    fn insert(&self, property: Property) -> Result<()>;

    /// Replaces a stored property wholesale.
    fn update(&self, property: Property) -> Result<()>;

    /// Applies a compute pass diff to the derived layer.
    fn apply_update(&self, update: &PropertyUpdate) -> Result<()>;

    /// Clears the dirty flag on every property of a creature. Returns how many
    /// were dirty.
    fn clear_dirty(&self, creature_id: &str) -> Result<usize>;

    /// Flags a single property as removed.
    fn soft_remove(&self, id: &str) -> Result<()>;

    /// Flags a property and all of its descendants as removed. Returns how
    /// many were removed.
    fn remove_subtree(&self, id: &str) -> Result<usize>;
}

/// Store for creature documents.
pub trait CreatureStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Creature>>;

    fn insert(&self, creature: Creature) -> Result<()>;

    /// Writes compute results and clears the dirty flag.
    fn apply_update(&self, id: &str, update: &CreatureUpdate) -> Result<()>;

    fn mark_dirty(&self, id: &str) -> Result<()>;
}

/// Denormalized per-creature variables, read and written as a whole.
pub trait VariablesStore: Send + Sync {
    fn get(&self, creature_id: &str) -> Result<Option<Scope>>;

    fn put(&self, creature_id: &str, variables: Scope) -> Result<()>;
}

/// Append-only audit log.
pub trait LogStore: Send + Sync {
    fn append(&self, entry: LogEntry) -> Result<()>;

    /// Entries written for a creature, oldest first.
    fn for_creature(&self, creature_id: &str) -> Result<Vec<LogEntry>>;
}

/// Durable mailbox of actions between simulating and writing their results.
pub trait ActionStore: Send + Sync {
    fn insert(&self, action: EngineAction) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<EngineAction>>;

    /// Removes and returns the stored action.
    fn remove(&self, id: &str) -> Result<Option<EngineAction>>;
}
