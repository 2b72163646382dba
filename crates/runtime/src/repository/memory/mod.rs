//! In-memory store implementations for testing and development.

mod creature;
mod property;

pub use creature::{
    InMemoryActionStore, InMemoryCreatureStore, InMemoryLogStore, InMemoryVariablesStore,
};
pub use property::InMemoryPropertyStore;
