//! Store layer for creature data
//!
//! Stores hold everything that changes while a creature is played:
//! - Properties and their derived layers
//! - Creature documents and variables snapshots
//! - The audit log and pending actions
//!
//! Rules live in `creature-core`; stores only persist what it derives.

mod error;
mod memory;
mod traits;
mod types;

use std::sync::Arc;

pub use error::{RepositoryError, Result};
pub use memory::{
    InMemoryActionStore, InMemoryCreatureStore, InMemoryLogStore, InMemoryPropertyStore,
    InMemoryVariablesStore,
};
pub use traits::{ActionStore, CreatureStore, LogStore, PropertyStore, VariablesStore};
pub use types::{Creature, CreatureUpdate, LogEntry};

use crate::events::ChangeFeed;

/// The set of stores a runtime reads and writes.
#[derive(Clone)]
pub struct Stores {
    pub properties: Arc<dyn PropertyStore>,
    pub creatures: Arc<dyn CreatureStore>,
    pub variables: Arc<dyn VariablesStore>,
    pub logs: Arc<dyn LogStore>,
    pub actions: Arc<dyn ActionStore>,
}

impl Stores {
    /// In-memory stores publishing on `feed`.
    pub fn in_memory(feed: &ChangeFeed) -> Self {
        Self {
            properties: Arc::new(InMemoryPropertyStore::with_feed(feed.clone())),
            creatures: Arc::new(InMemoryCreatureStore::with_feed(feed.clone())),
            variables: Arc::new(InMemoryVariablesStore::with_feed(feed.clone())),
            logs: Arc::new(InMemoryLogStore::new()),
            actions: Arc::new(InMemoryActionStore::new()),
        }
    }
}
