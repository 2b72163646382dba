//! Action documents: the task an action starts from and everything applying
//! it produced.

use std::collections::BTreeMap;

use creature_core::property::AdjustmentOperation;
use creature_core::{CreatureId, Property, PropertyId, PropertyType, Scope, Value};
use serde::{Deserialize, Serialize};

use crate::api::Decision;

/// A pending or applied action on one creature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAction {
    #[serde(rename = "_id")]
    pub id: String,
    pub creature_id: CreatureId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabletop_id: Option<String>,
    pub task: Task,
    #[serde(default)]
    pub results: Vec<TaskResult>,
    #[serde(default)]
    pub task_count: usize,
    #[serde(default)]
    pub is_simulation: bool,
    #[serde(default)]
    pub step_through: bool,
    /// Answers recorded while simulating, replayed when the action is run.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decisions: Vec<Decision>,
}

impl EngineAction {
    pub fn new(id: impl Into<String>, creature_id: impl Into<CreatureId>, task: Task) -> Self {
        Self {
            id: id.into(),
            creature_id: creature_id.into(),
            tabletop_id: None,
            task,
            results: Vec::new(),
            task_count: 0,
            is_simulation: false,
            step_through: false,
            decisions: Vec::new(),
        }
    }

    /// Starts from applying one property.
    pub fn prop(
        id: impl Into<String>,
        creature_id: impl Into<CreatureId>,
        prop_id: impl Into<PropertyId>,
        target_ids: Vec<CreatureId>,
    ) -> Self {
        Self::new(
            id,
            creature_id,
            Task::Prop(PropTask {
                prop_id: prop_id.into(),
                target_ids,
            }),
        )
    }

    pub fn on_tabletop(mut self, tabletop_id: impl Into<String>) -> Self {
        self.tabletop_id = Some(tabletop_id.into());
        self
    }

    /// Every logged line, in order.
    pub fn contents(&self) -> impl Iterator<Item = &LogContent> {
        self.results
            .iter()
            .flat_map(|result| &result.mutations)
            .flat_map(|mutation| &mutation.contents)
    }

    /// Every mutation, in order.
    pub fn mutations(&self) -> impl Iterator<Item = &Mutation> {
        self.results.iter().flat_map(|result| &result.mutations)
    }
}

/// One step of action application.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Task {
    /// Apply a property's effects.
    Prop(PropTask),
    /// Damage, heal or set one attribute.
    DamageProp(DamagePropTask),
    /// Spend items as ammunition.
    ItemAsAmmo(ItemAsAmmoTask),
    /// Roll an ability or skill check.
    Check(CheckTask),
    /// Restore everything that resets on an event such as a long rest.
    Reset(ResetTask),
    /// Pick a spell and slot, spend the slot, then apply the spell.
    CastSpell(CastSpellTask),
}

impl Task {
    pub fn target_ids(&self) -> &[CreatureId] {
        match self {
            Task::Prop(task) => &task.target_ids,
            Task::DamageProp(task) => &task.target_ids,
            Task::ItemAsAmmo(task) => &task.target_ids,
            Task::Check(task) => &task.target_ids,
            Task::Reset(task) => &task.target_ids,
            Task::CastSpell(task) => &task.target_ids,
        }
    }

    /// The property the task is about, when there is one.
    pub fn prop_id(&self) -> Option<&str> {
        match self {
            Task::Prop(task) => Some(&task.prop_id),
            Task::DamageProp(task) => task.target_prop_id.as_deref(),
            Task::ItemAsAmmo(task) => Some(&task.item_id),
            Task::Check(task) => task.prop_id.as_deref(),
            Task::Reset(_) => None,
            Task::CastSpell(task) => task.spell_id.as_deref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropTask {
    pub prop_id: PropertyId,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamagePropTask {
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub operation: AdjustmentOperation,
    pub value: f64,
    /// The attribute on the target; absent when there is no target to hit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_prop_id: Option<PropertyId>,
    /// Variable name shown when there is no attribute to name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<String>,
    #[serde(default)]
    pub silent: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemAsAmmoTask {
    pub item_id: PropertyId,
    pub quantity: f64,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_id: Option<PropertyId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill_variable: Option<String>,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetTask {
    pub event_name: String,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastSpellTask {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spell_id: Option<PropertyId>,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
}

/// What one task (or the closing of one) contributed.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prop_id: Option<PropertyId>,
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
    /// Plain entries that stay for the rest of the action.
    #[serde(default, skip_serializing_if = "Scope::is_empty")]
    pub scope: Scope,
    /// Entries stacked over whatever the name held before.
    #[serde(default, skip_serializing_if = "Scope::is_empty")]
    pub push_scope: Scope,
    /// Names whose top entry is dropped, restoring the one below.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pop_scope: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mutations: Vec<Mutation>,
}

impl TaskResult {
    pub fn new(prop_id: Option<PropertyId>, target_ids: Vec<CreatureId>) -> Self {
        Self {
            prop_id,
            target_ids,
            ..Self::default()
        }
    }

    pub fn append_log(&mut self, content: LogContent, target_ids: Vec<CreatureId>) {
        self.mutations.push(Mutation {
            target_ids,
            contents: vec![content],
            ..Mutation::default()
        });
    }
}

/// A buffered change to properties plus the log lines describing it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    #[serde(default)]
    pub target_ids: Vec<CreatureId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub updates: Vec<Update>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub removals: Vec<Removal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inserts: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<LogContent>,
}

/// Field writes on one property: `set` replaces, `inc` adds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Update {
    pub prop_id: PropertyId,
    #[serde(rename = "type")]
    pub prop_type: PropertyType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inc: BTreeMap<String, f64>,
}

impl Update {
    pub fn new(prop_id: impl Into<PropertyId>, prop_type: PropertyType) -> Self {
        Self {
            prop_id: prop_id.into(),
            prop_type,
            set: BTreeMap::new(),
            inc: BTreeMap::new(),
        }
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn inc(mut self, field: impl Into<String>, amount: f64) -> Self {
        self.inc.insert(field.into(), amount);
        self
    }

    /// Writes the update onto a copy of the property.
    pub fn apply_to(
        &self,
        property: &mut Property,
    ) -> Result<(), creature_core::property::FieldError> {
        for (field, value) in &self.set {
            property.set_field(field, value)?;
        }
        for (field, amount) in &self.inc {
            property.inc_field(field, *amount)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Removal {
    pub prop_id: PropertyId,
}

/// One line of the action log.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// The value contains inline calculation markup.
    #[serde(default, skip_serializing_if = "is_false")]
    pub inline: bool,
    /// Shown only to the creature's owner.
    #[serde(default, skip_serializing_if = "is_false")]
    pub silenced: bool,
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

impl LogContent {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn valued(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::named("Error").with_value(message)
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn inline(mut self) -> Self {
        self.inline = true;
        self
    }

    pub fn silenced(mut self, silenced: bool) -> Self {
        self.silenced = silenced;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_content_omits_false_flags() {
        let content = LogContent::named("Hit!").with_value("**15**");
        let json = serde_json::to_value(&content).expect("serialize");
        assert_eq!(json, serde_json::json!({ "name": "Hit!", "value": "**15**" }));

        let inline = serde_json::to_value(LogContent::valued("x").inline()).expect("serialize");
        assert_eq!(inline, serde_json::json!({ "value": "x", "inline": true }));
    }

    #[test]
    fn tasks_serialize_with_a_kind_tag() {
        let task = Task::Prop(PropTask {
            prop_id: "sword".into(),
            target_ids: vec!["goblin".into()],
        });
        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({ "kind": "prop", "propId": "sword", "targetIds": ["goblin"] })
        );
        let back: Task = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, task);
    }
}
