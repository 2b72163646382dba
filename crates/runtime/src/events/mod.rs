//! Topic-based change feed for store writes.
//!
//! Stores publish a [`ChangeEvent`] for every write, and consumers such as
//! session watchers subscribe only to the topics they need.

mod bus;
mod types;

pub use bus::{ChangeEvent, ChangeFeed, Topic};
pub use types::{CreatureEvent, PropertyEvent, VariablesEvent};
