//! Documents the stores hold besides properties.

use chrono::{DateTime, Utc};
use creature_core::{ComputeError, CreatureId, EngineConfig};
use serde::{Deserialize, Serialize};

use crate::action::LogContent;

/// Creature document: the root of a property tree plus compute bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creature {
    #[serde(rename = "_id")]
    pub id: CreatureId,
    #[serde(default)]
    pub name: String,
    /// Set when stored data changed since the last compute pass.
    #[serde(default)]
    pub dirty: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compute_version: Option<String>,
    #[serde(default)]
    pub prop_count: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compute_errors: Vec<ComputeError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_computed_at: Option<DateTime<Utc>>,
}

impl Creature {
    pub fn new(id: impl Into<CreatureId>) -> Self {
        Self {
            id: id.into(),
            dirty: true,
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// What a compute pass writes back to the creature document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatureUpdate {
    pub compute_errors: Vec<ComputeError>,
    pub prop_count: usize,
    pub compute_version: String,
    pub last_computed_at: DateTime<Utc>,
}

impl CreatureUpdate {
    pub fn new(compute_errors: Vec<ComputeError>, prop_count: usize) -> Self {
        Self {
            compute_errors,
            prop_count,
            compute_version: EngineConfig::COMPUTE_VERSION.to_owned(),
            last_computed_at: Utc::now(),
        }
    }

    /// Writes the update and clears `dirty`. An empty error list clears the
    /// stored errors.
    pub fn apply_to(&self, creature: &mut Creature) {
        creature.compute_errors = self.compute_errors.clone();
        creature.prop_count = self.prop_count;
        creature.compute_version = Some(self.compute_version.clone());
        creature.last_computed_at = Some(self.last_computed_at);
        creature.dirty = false;
    }
}

/// One audit log entry: everything a single action wrote to the log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub creature_id: CreatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabletop_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_id: Option<String>,
    pub content: Vec<LogContent>,
    /// Every creature a logged line was about.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_ids: Vec<CreatureId>,
    pub date: DateTime<Utc>,
}
