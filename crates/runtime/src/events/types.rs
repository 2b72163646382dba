//! Change notifications published by the stores.

use creature_core::{CreatureId, Property, PropertyId};
use serde::{Deserialize, Serialize};

use crate::repository::Creature;

/// Property writes, keyed by the creature that owns the property.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyEvent {
    Added {
        root_id: CreatureId,
        property: Box<Property>,
    },
    Changed {
        root_id: CreatureId,
        property: Box<Property>,
    },
    Removed {
        root_id: CreatureId,
        prop_id: PropertyId,
    },
}

impl PropertyEvent {
    pub fn root_id(&self) -> &str {
        match self {
            Self::Added { root_id, .. }
            | Self::Changed { root_id, .. }
            | Self::Removed { root_id, .. } => root_id,
        }
    }
}

/// Creature document writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatureEvent {
    pub creature: Creature,
}

/// A creature's variables snapshot was replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariablesEvent {
    pub creature_id: CreatureId,
}
